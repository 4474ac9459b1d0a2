//! Durability: point-in-time RDB snapshots and the append-only command log,
//! tied together behind one `Persistence` handle that the server wires up
//! as a `dispatcher::PostCommitSink` and polls on a background ticker.
pub mod aof;
pub mod rdb;

use crate::{
    config::Config,
    db::Db,
    dispatcher::PostCommitSink,
    error::Error,
};
use bytes::Bytes;
use log::{error, info, warn};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// `(changes, seconds)` pairs from the `save` directive: a save fires once
/// `changes` mutations have landed within `seconds` of the last save.
struct SaveTrigger {
    changes: u64,
    seconds: u64,
}

pub struct Persistence {
    db: Arc<Db>,
    rdb_path: PathBuf,
    rdb_enabled: bool,
    aof: Option<Arc<aof::AofWriter>>,
    save_triggers: Vec<SaveTrigger>,
    changes_since_save: AtomicU64,
    last_save_at: AtomicU64,
}

impl Persistence {
    /// Loads whatever durable state exists, installs it into `db`, and
    /// returns a handle ready to be registered as a commit sink. AOF wins
    /// over RDB when both are enabled, since it is strictly more recent.
    pub fn bootstrap(config: &Config, db: Arc<Db>) -> Result<Self, Error> {
        let rdb_path = PathBuf::from(&config.rdb_file);
        let aof_path = PathBuf::from(&config.aof_file);

        let aof = if config.aof_enabled {
            Some(Arc::new(aof::AofWriter::open(&aof_path, config.aof_fsync)?))
        } else {
            None
        };

        if config.aof_enabled {
            let commands = aof::replay(&aof_path)?;
            if !commands.is_empty() {
                info!("replaying {} commands from {}", commands.len(), aof_path.display());
                replay_into(&db, commands);
            }
        } else if config.rdb_enabled {
            let entries = rdb::load(&rdb_path)?;
            if !entries.is_empty() {
                info!("loaded {} keys from {}", entries.len(), rdb_path.display());
                db.replace_all(entries);
            }
        }

        let save_triggers = config
            .save_trigger_pairs()
            .into_iter()
            .map(|(changes, seconds)| SaveTrigger { changes, seconds })
            .collect();

        Ok(Self {
            db,
            rdb_path,
            rdb_enabled: config.rdb_enabled,
            aof,
            save_triggers,
            changes_since_save: AtomicU64::new(0),
            last_save_at: AtomicU64::new(crate::time::now_millis() as u64 / 1000),
        })
    }

    /// Hands the server a sink to register with the dispatcher. Returns
    /// `None` when neither RDB change-tracking nor AOF needs commit
    /// notifications (both disabled).
    pub fn as_sink(self: &Arc<Self>) -> Arc<dyn PostCommitSink> {
        self.clone()
    }

    /// Saves immediately regardless of the configured triggers, used for
    /// `SAVE`-equivalent shutdown handling.
    pub fn save_now(&self) -> Result<(), Error> {
        if !self.rdb_enabled {
            return Ok(());
        }
        rdb::save(&self.db, &self.rdb_path)?;
        self.changes_since_save.store(0, Ordering::SeqCst);
        self.last_save_at.store(crate::time::now_millis() as u64 / 1000, Ordering::SeqCst);
        Ok(())
    }

    /// Runs the RDB "does a trigger pair's threshold fire" check against
    /// the mutation count observed since the last save.
    fn maybe_save(&self) {
        if !self.rdb_enabled || self.save_triggers.is_empty() {
            return;
        }
        let changes = self.changes_since_save.load(Ordering::SeqCst);
        let elapsed = crate::time::now_millis() as u64 / 1000 - self.last_save_at.load(Ordering::SeqCst);
        let due = self.save_triggers.iter().any(|t| changes >= t.changes && elapsed >= t.seconds);
        if due {
            if let Err(e) = self.save_now() {
                error!("background RDB save failed: {}", e);
            }
        }
    }

    /// Background ticker body; the server spawns this in a loop on its own
    /// interval (e.g. once a second) alongside the expiration sweeper.
    pub fn tick(&self) {
        self.maybe_save();
        if let Some(aof) = &self.aof {
            if let Err(e) = aof.fsync() {
                warn!("AOF fsync failed: {}", e);
            }
        }
    }

    /// Compacts the append-only log to the minimal command stream that
    /// reconstructs the current keyspace.
    pub fn rewrite_aof(&self) -> Result<(), Error> {
        match &self.aof {
            Some(aof) => aof.rewrite(&self.db),
            None => Ok(()),
        }
    }
}

impl PostCommitSink for Persistence {
    fn on_commit(&self, verb: &str, args: &[Bytes]) {
        self.changes_since_save.fetch_add(1, Ordering::SeqCst);
        if let Some(aof) = &self.aof {
            aof.on_commit(verb, args);
        }
    }
}

/// Feeds replayed AOF commands straight through the dispatcher, skipping
/// authorization and post-commit notification: recovery is trusted input.
fn replay_into(db: &Db, commands: Vec<(String, Vec<Bytes>)>) {
    use std::collections::VecDeque;
    for (verb, args) in commands {
        if let Some(command) = crate::dispatcher::lookup(&verb) {
            let mut args: VecDeque<Bytes> = args.into();
            if let Err(e) = (command.handler)(db, &mut args) {
                warn!("skipping AOF command '{}' during replay: {}", verb, e);
            }
        } else {
            warn!("unknown command '{}' encountered during AOF replay", verb);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::DEFAULT_VECTOR_DIM;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.rdb_file = dir.join("dump.rdb").to_string_lossy().into_owned();
        config.aof_file = dir.join("appendonly.aof").to_string_lossy().into_owned();
        config
    }

    #[test]
    fn bootstrap_with_nothing_on_disk_is_empty() {
        let dir = std::env::temp_dir().join("keyspaced-persistence-test-empty");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::remove_file(dir.join("dump.rdb")).ok();

        let db = Arc::new(Db::new(4, DEFAULT_VECTOR_DIM));
        let persistence = Persistence::bootstrap(&test_config(&dir), db.clone()).unwrap();
        assert_eq!(0, db.dbsize());
        persistence.save_now().unwrap();
        assert!(dir.join("dump.rdb").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn aof_enabled_replays_prior_commands_on_bootstrap() {
        let dir = std::env::temp_dir().join("keyspaced-persistence-test-aof-replay");
        std::fs::create_dir_all(&dir).unwrap();
        let aof_path = dir.join("appendonly.aof");
        std::fs::remove_file(&aof_path).ok();

        let mut config = test_config(&dir);
        config.aof_enabled = true;

        let writer = aof::AofWriter::open(&aof_path, config.aof_fsync).unwrap();
        writer.append("SET", &[Bytes::from("foo"), Bytes::from("bar")]).unwrap();
        drop(writer);

        let db = Arc::new(Db::new(4, DEFAULT_VECTOR_DIM));
        Persistence::bootstrap(&config, db.clone()).unwrap();
        assert!(db.exists(b"foo"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn on_commit_counts_changes_for_the_save_trigger() {
        let dir = std::env::temp_dir().join("keyspaced-persistence-test-trigger");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::remove_file(dir.join("dump.rdb")).ok();

        let mut config = test_config(&dir);
        config.save_rules = vec![0, 1];

        let db = Arc::new(Db::new(4, DEFAULT_VECTOR_DIM));
        let persistence = Persistence::bootstrap(&config, db).unwrap();
        persistence.on_commit("SET", &[Bytes::from("foo"), Bytes::from("bar")]);
        persistence.tick();
        assert!(dir.join("dump.rdb").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
