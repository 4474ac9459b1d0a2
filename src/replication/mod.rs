//! Primary/replica replication: a primary fans mutator commands out to
//! connected replicas behind a bounded backlog; a replica runs the PSYNC
//! handshake against its primary, installs the resulting snapshot, and
//! applies the live command tail.
use crate::{
    config::Config,
    db::Db,
    dispatcher::{self, PostCommitSink, ServerContext},
    error::Error,
    persistence::{aof, rdb},
};
use bytes::{Bytes, BytesMut};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

const BACKLOG_BYTES: usize = 1_000_000;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const FAN_OUT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

/// A single, fixed replication id for this process's lifetime. Redis-style
/// 40 hex chars; regenerated on every restart since we never implement
/// partial resync.
fn generate_replid() -> String {
    let mut bytes = [0u8; 20];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}

/// Recent propagated bytes, trimmed to `BACKLOG_BYTES`, plus the offset of
/// the first byte still retained. Exists so a future partial-resync
/// extension (`+CONTINUE`) has something to build on; this implementation
/// always falls back to full resync.
struct Backlog {
    buf: VecDeque<u8>,
    start_offset: u64,
}

impl Backlog {
    fn new() -> Self {
        Self {
            buf: VecDeque::new(),
            start_offset: 0,
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
        while self.buf.len() > BACKLOG_BYTES {
            self.buf.pop_front();
            self.start_offset += 1;
        }
    }
}

/// Replication state shared by the primary's accept loop and its
/// post-commit sink, or by a replica's apply loop.
pub struct Replication {
    role: Mutex<Role>,
    replid: String,
    offset: AtomicU64,
    backlog: Mutex<Backlog>,
    fan_out: broadcast::Sender<Bytes>,
}

impl Replication {
    pub fn new() -> Self {
        let (fan_out, _) = broadcast::channel(FAN_OUT_CAPACITY);
        Self {
            role: Mutex::new(Role::Primary),
            replid: generate_replid(),
            offset: AtomicU64::new(0),
            backlog: Mutex::new(Backlog::new()),
            fan_out,
        }
    }

    pub fn role(&self) -> Role {
        *self.role.lock()
    }

    fn set_role(&self, role: Role) {
        *self.role.lock() = role;
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Feeds the command relay new replicas subscribe to.
    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.fan_out.subscribe()
    }

    fn propagate_raw(&self, record: Bytes) {
        self.backlog.lock().append(&record);
        self.offset.fetch_add(record.len() as u64, Ordering::SeqCst);
        let _ = self.fan_out.send(record);
    }
}

impl PostCommitSink for Replication {
    fn on_commit(&self, verb: &str, args: &[Bytes]) {
        if self.role() != Role::Primary {
            return;
        }
        let record = Bytes::from(aof::encode_command(verb, args));
        self.propagate_raw(record);
    }
}

/// Runs the primary-side accept loop, handing each incoming replica its own
/// full-resync-then-tail session.
pub async fn serve_primary(listener: TcpListener, ctx: Arc<ServerContext>, repl: Arc<Replication>) -> Result<(), Error> {
    info!("replication: listening for replicas on {:?}", listener.local_addr());
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let ctx = ctx.clone();
                let repl = repl.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_replica_session(socket, ctx, repl).await {
                        warn!("replica session with {} ended: {}", addr, e);
                    }
                });
            }
            Err(e) => error!("replication: accept failed: {}", e),
        }
    }
}

/// One replica connection on the primary side: consumes the handshake,
/// streams a full-resync snapshot, then relays the live command tail.
async fn serve_replica_session(mut socket: TcpStream, ctx: Arc<ServerContext>, repl: Arc<Replication>) -> Result<(), Error> {
    let mut reader = FramedRead::new(&mut socket, crate::wire::RequestDecoder);

    // REPLCONF listening-port / REPLCONF capa ... / PSYNC ? -1
    loop {
        let request = match reader.next().await {
            Some(Ok(r)) => r,
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        };
        let verb = request.first().map(|v| String::from_utf8_lossy(v).to_uppercase());
        match verb.as_deref() {
            Some("REPLCONF") => continue,
            Some("PSYNC") => break,
            _ => return Err(Error::Syntax("expected PSYNC handshake".into())),
        }
    }

    let snapshot = rdb::to_bytes(&ctx.db)?;
    let response = format!("+FULLRESYNC {} {}\r\n", repl.replid, repl.offset());
    socket.write_all(response.as_bytes()).await?;
    socket.write_all(&(snapshot.len() as u64).to_be_bytes()).await?;
    socket.write_all(&snapshot).await?;
    socket.flush().await?;
    info!("replica full-resync sent ({} bytes)", snapshot.len());

    let mut rx = repl.subscribe();
    loop {
        match rx.recv().await {
            Ok(record) => {
                if socket.write_all(&record).await.is_err() {
                    return Ok(());
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {
                warn!("replica fell behind the backlog; dropping connection for a fresh full resync");
                return Ok(());
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Runs the replica side forever: connect, handshake, apply the snapshot,
/// apply the live tail, and on any read error reconnect after a fixed
/// backoff and redo the whole handshake.
pub async fn run_replica(host: String, port: u16, ctx: Arc<ServerContext>, repl: Arc<Replication>) {
    repl.set_role(Role::Replica);
    ctx.set_read_only(true);
    loop {
        if let Err(e) = replicate_once(&host, port, &ctx, &repl).await {
            warn!("replication with {}:{} failed: {}; reconnecting in {:?}", host, port, e, RECONNECT_BACKOFF);
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

async fn replicate_once(host: &str, port: u16, ctx: &Arc<ServerContext>, repl: &Arc<Replication>) -> Result<(), Error> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream
        .write_all(format!("REPLCONF listening-port {}\r\n", port).as_bytes())
        .await?;
    stream.write_all(b"REPLCONF capa eof capa psync2\r\n").await?;
    stream.write_all(b"PSYNC ? -1\r\n").await?;
    stream.flush().await?;

    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if !line.starts_with("+FULLRESYNC") {
        return Err(Error::Config(format!("unexpected PSYNC reply: {}", line.trim_end())));
    }
    let mut parts = line.trim_end().split_whitespace();
    parts.next();
    let master_replid = parts.next().unwrap_or("?").to_owned();
    let offset: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    info!("full resync from primary replid={} offset={}", master_replid, offset);

    let mut len_bytes = [0u8; 8];
    reader.read_exact(&mut len_bytes).await?;
    let len = u64::from_be_bytes(len_bytes);
    let mut snapshot = vec![0u8; len as usize];
    reader.read_exact(&mut snapshot).await?;
    let entries = rdb::from_bytes(&snapshot)?;
    ctx.db.replace_all(entries);
    repl.offset.store(offset, Ordering::SeqCst);

    let mut tail = FramedRead::new(reader, crate::wire::RequestDecoder);
    while let Some(request) = tail.next().await {
        let mut request = request?;
        if request.is_empty() {
            continue;
        }
        let verb = String::from_utf8_lossy(&request.remove(0)).to_uppercase();
        apply_replicated_command(&ctx.db, &verb, request);
    }
    Ok(())
}

/// Applies one command from the primary's tail directly against the
/// keyspace, bypassing the read-only-replica check that blocks client
/// mutators (this *is* the permitted mutation path on a replica).
fn apply_replicated_command(db: &Db, verb: &str, args: Vec<Bytes>) {
    match dispatcher::lookup(verb) {
        Some(command) => {
            let mut args: VecDeque<Bytes> = args.into();
            if let Err(e) = (command.handler)(db, &mut args) {
                warn!("replicated command '{}' failed to apply: {}", verb, e);
            }
        }
        None => warn!("unknown replicated command '{}'", verb),
    }
}

/// Starts replication according to `config.replicaof`: binds the
/// replica-accept listener if acting as a primary, or spawns the
/// replica-apply loop if a primary is configured.
pub async fn start(config: &Config, ctx: Arc<ServerContext>, repl: Arc<Replication>, listener: TcpListener) -> Result<(), Error> {
    match config.replica_of() {
        Some((host, port)) => {
            tokio::spawn(run_replica(host, port, ctx, repl));
            Ok(())
        }
        None => serve_primary(listener, ctx, repl).await,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::DEFAULT_VECTOR_DIM;

    #[test]
    fn new_replication_starts_as_primary_with_zero_offset() {
        let repl = Replication::new();
        assert_eq!(Role::Primary, repl.role());
        assert_eq!(0, repl.offset());
        assert_eq!(40, repl.replid.len());
    }

    #[test]
    fn on_commit_advances_the_offset_and_backlog() {
        let repl = Replication::new();
        repl.on_commit("SET", &[Bytes::from("foo"), Bytes::from("bar")]);
        assert!(repl.offset() > 0);
    }

    #[test]
    fn on_commit_is_a_no_op_once_demoted_to_replica() {
        let repl = Replication::new();
        repl.set_role(Role::Replica);
        repl.on_commit("SET", &[Bytes::from("foo"), Bytes::from("bar")]);
        assert_eq!(0, repl.offset());
    }

    #[test]
    fn apply_replicated_command_runs_against_the_keyspace() {
        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        apply_replicated_command(&db, "SET", vec![Bytes::from("foo"), Bytes::from("bar")]);
        assert!(db.exists(b"foo"));
    }
}
