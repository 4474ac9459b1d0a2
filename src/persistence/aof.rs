//! Append-only command log: every successful mutator is appended in
//! RESP-array form, directly replayable through `wire::RequestDecoder`.
use crate::{
    config::AppendFsync,
    db::Db,
    dispatcher::PostCommitSink,
    error::Error,
    time::now_millis,
    value::Value,
    wire::RequestDecoder,
};
use bytes::{Bytes, BytesMut};
use log::error;
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tokio_util::codec::Decoder;

/// Encodes one command as a RESP array of bulk strings, the same framing
/// Redis itself uses for its append-only file.
pub fn encode_command(verb: &str, args: &[Bytes]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len() + 1).as_bytes());
    out.extend_from_slice(format!("${}\r\n", verb.len()).as_bytes());
    out.extend_from_slice(verb.as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Replays every command record in `path`, in file order. Missing file
/// replays as empty, matching RDB's "absent state" convention.
pub fn replay(path: &Path) -> Result<Vec<(String, Vec<Bytes>)>, Error> {
    let contents = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut buf = BytesMut::from(contents.as_slice());
    let mut out = Vec::new();
    let mut decoder = RequestDecoder;
    while !buf.is_empty() {
        match decoder.decode(&mut buf)? {
            Some(request) if request.is_empty() => continue,
            Some(mut request) => {
                let verb = String::from_utf8_lossy(&request.remove(0)).to_uppercase();
                out.push((verb, request));
            }
            None => break,
        }
    }
    Ok(out)
}

pub struct AofWriter {
    path: PathBuf,
    file: Mutex<File>,
    fsync: AppendFsync,
}

impl AofWriter {
    pub fn open(path: &Path, fsync: AppendFsync) -> Result<Self, Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_owned(),
            file: Mutex::new(file),
            fsync,
        })
    }

    pub fn append(&self, verb: &str, args: &[Bytes]) -> Result<(), Error> {
        let record = encode_command(verb, args);
        let mut file = self.file.lock();
        file.write_all(&record)?;
        if matches!(self.fsync, AppendFsync::Always) {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Called by the background fsync ticker under the `everysec` policy.
    pub fn fsync(&self) -> Result<(), Error> {
        self.file.lock().sync_data().map_err(Into::into)
    }

    /// Replaces the log with the minimal command stream that reconstructs
    /// `db`'s current state, while readers keep seeing the old file until
    /// the rename completes.
    pub fn rewrite(&self, db: &Db) -> Result<(), Error> {
        let body = build_minimal_aof(db);
        let tmp_path = self.path.with_extension("aof.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&body)?;
        tmp.sync_all()?;

        let mut file = self.file.lock();
        std::fs::rename(&tmp_path, &self.path)?;
        *file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

impl PostCommitSink for AofWriter {
    fn on_commit(&self, verb: &str, args: &[Bytes]) {
        if let Err(e) = self.append(verb, args) {
            error!("AOF append failed for {}: {}", verb, e);
        }
    }
}

fn build_minimal_aof(db: &Db) -> Vec<u8> {
    let mut out = Vec::new();
    let mut push = |verb: &str, args: Vec<Bytes>| out.extend_from_slice(&encode_command(verb, &args));

    for (key, slot) in db.snapshot() {
        match &slot.value {
            Value::Blob(b) => push("SET", vec![key.clone(), Bytes::copy_from_slice(b)]),
            Value::List(l) => {
                let l = l.read();
                if !l.is_empty() {
                    let mut args = vec![key.clone()];
                    args.extend(l.iter().cloned());
                    push("RPUSH", args);
                }
            }
            Value::Set(s) => {
                let s = s.read();
                if !s.is_empty() {
                    let mut args = vec![key.clone()];
                    args.extend(s.iter().cloned());
                    push("SADD", args);
                }
            }
            Value::Hash(h) => {
                for (field, value) in h.read().iter() {
                    push("HSET", vec![key.clone(), field.clone(), value.clone()]);
                }
            }
            Value::SortedSet(z) => {
                let z = z.read();
                for member in z.get_values() {
                    let score = z.get_score(&member).map(|s| s.0).unwrap_or(0.0);
                    push("ZADD", vec![key.clone(), score.to_string().into(), member]);
                }
            }
            Value::Stream(s) => {
                use crate::value::stream::StreamId;
                for entry in s.read().range(StreamId::MIN, StreamId::MAX, None) {
                    let mut args = vec![key.clone(), entry.id.to_string().into()];
                    for (field, value) in entry.fields {
                        args.push(field);
                        args.push(value);
                    }
                    push("XADD", args);
                }
            }
            Value::Bitmap(b) => {
                let b = b.read();
                if !b.is_empty() {
                    let last_offset = b.len() * 8 - 1;
                    let mut last_bit_set = false;
                    for (byte_idx, byte) in b.iter().enumerate() {
                        for bit_idx in 0..8 {
                            if (byte >> bit_idx) & 1 == 1 {
                                let offset = byte_idx * 8 + bit_idx;
                                push("SETBIT", vec![key.clone(), offset.to_string().into(), Bytes::from_static(b"1")]);
                                last_bit_set = last_bit_set || offset == last_offset;
                            }
                        }
                    }
                    // SETBIT only creates/extends a bitmap up to the highest offset it
                    // touches; if the top bit is 0, emit it explicitly so the
                    // reconstructed bitmap has the same byte length as the original.
                    if !last_bit_set {
                        push("SETBIT", vec![key.clone(), last_offset.to_string().into(), Bytes::from_static(b"0")]);
                    }
                }
            }
            Value::Geo(g) => {
                let g = g.read();
                if !g.is_empty() {
                    let mut args = vec![key.clone()];
                    for (member, (lon, lat)) in g.iter() {
                        args.push(lon.to_string().into());
                        args.push(lat.to_string().into());
                        args.push(member.clone());
                    }
                    push("GEOADD", args);
                }
            }
            Value::Vector(v) => {
                let v = v.read();
                if !v.is_empty() {
                    let mut args = vec![key.clone()];
                    args.extend(v.iter().map(|x| x.to_string().into()));
                    push("VECADD", args);
                }
            }
            Value::TimeSeries(t) => {
                for sample in t.read().range(i64::MIN, i64::MAX, None) {
                    push(
                        "TSADD",
                        vec![key.clone(), sample.value.to_string().into(), sample.timestamp.to_string().into()],
                    );
                }
            }
            _ => {}
        }
        if let Some(expire_at) = slot.expire_at {
            let ttl_seconds = (expire_at - now_millis()) / 1000;
            if ttl_seconds > 0 {
                push("EXPIRE", vec![key.clone(), ttl_seconds.to_string().into()]);
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{db::{Slot, DEFAULT_VECTOR_DIM}, wire::Request};
    use std::collections::VecDeque;

    #[test]
    fn encodes_a_command_as_resp_array() {
        let record = encode_command("SET", &[Bytes::from("foo"), Bytes::from("bar")]);
        assert_eq!(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n".to_vec(), record);
    }

    #[test]
    fn append_then_replay_round_trips() {
        let dir = std::env::temp_dir().join("keyspaced-aof-test-append-replay");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("appendonly.aof");
        std::fs::remove_file(&path).ok();

        let writer = AofWriter::open(&path, AppendFsync::Always).unwrap();
        writer.append("SET", &[Bytes::from("foo"), Bytes::from("bar")]).unwrap();
        writer.append("INCR", &[Bytes::from("counter")]).unwrap();

        let replayed = replay(&path).unwrap();
        assert_eq!(
            vec![
                ("SET".to_owned(), vec![Bytes::from("foo"), Bytes::from("bar")] as Request),
                ("INCR".to_owned(), vec![Bytes::from("counter")]),
            ],
            replayed
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rewrite_produces_a_replayable_reconstruction() {
        let dir = std::env::temp_dir().join("keyspaced-aof-test-rewrite");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("appendonly.aof");
        std::fs::remove_file(&path).ok();

        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripe(b"foo", |map| {
            map.insert(Bytes::from("foo"), Slot::new(Value::new(b"bar")));
        });

        let writer = AofWriter::open(&path, AppendFsync::EverySecond).unwrap();
        writer.rewrite(&db).unwrap();
        let replayed = replay(&path).unwrap();
        assert_eq!(1, replayed.len());
        assert_eq!("SET", replayed[0].0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rewrite_reconstructs_a_bitmap_with_setbit_not_setrange() {
        let dir = std::env::temp_dir().join("keyspaced-aof-test-rewrite-bitmap");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("appendonly.aof");
        std::fs::remove_file(&path).ok();

        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripe(b"b", |map| {
            map.insert(
                Bytes::from("b"),
                Slot::new(Value::Bitmap(crate::value::locked::Value::new(BytesMut::from(&[0b0000_0010u8][..])))),
            );
        });

        let writer = AofWriter::open(&path, AppendFsync::EverySecond).unwrap();
        writer.rewrite(&db).unwrap();
        let replayed = replay(&path).unwrap();
        assert!(replayed.iter().all(|(verb, _)| verb == "SETBIT"));

        let restored = Db::new(4, DEFAULT_VECTOR_DIM);
        for (verb, args) in replayed {
            let command = crate::dispatcher::lookup(&verb).unwrap();
            let mut args: VecDeque<Bytes> = args.into();
            (command.handler)(&restored, &mut args).unwrap();
        }
        assert_eq!(Some("bitmap"), restored.type_name(b"b"));
        let get_bit = |offset: &str| {
            let mut args: VecDeque<Bytes> = vec![Bytes::from("b"), Bytes::copy_from_slice(offset.as_bytes())].into();
            crate::cmd::bitmap::getbit(&restored, &mut args).unwrap()
        };
        assert_eq!(Value::Integer(0), get_bit("0"));
        assert_eq!(Value::Integer(1), get_bit("1"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
