//! Point-in-time binary snapshot of the whole keyspace: a magic header,
//! one section per live key, an end-of-data marker, and a CRC32 trailer.
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{geo::GeoSet, sorted_set::SortedSet, stream::{Stream, StreamId}, timeseries::{Sample, TimeSeries}, Value},
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::{Bytes, BytesMut};
use crc32fast::Hasher;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::{self, Cursor, Read, Write},
    path::Path,
};

const MAGIC: &[u8; 8] = b"KSPDRDB\0";
const VERSION: u8 = 1;
const END_MARKER: u8 = 0xFF;

const TAG_STRING: u8 = 0;
const TAG_LIST: u8 = 1;
const TAG_SET: u8 = 2;
const TAG_HASH: u8 = 3;
const TAG_SORTED_SET: u8 = 4;
const TAG_STREAM: u8 = 5;
const TAG_BITMAP: u8 = 6;
const TAG_GEO: u8 = 7;
const TAG_VECTOR: u8 = 8;
const TAG_TIMESERIES: u8 = 9;

fn write_bytes(out: &mut Vec<u8>, b: &[u8]) -> io::Result<()> {
    out.write_u32::<BigEndian>(b.len() as u32)?;
    out.write_all(b)
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Bytes, Error> {
    let len = cursor.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(Bytes::from(buf))
}

/// Serializes the whole keyspace to `path`, via a temp file that is
/// fsync'd and atomically renamed into place.
pub fn save(db: &Db, path: &Path) -> Result<(), Error> {
    let body = to_bytes(db)?;
    let tmp_path = path.with_extension("rdb.tmp");
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(&body)?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Serializes the whole keyspace to an in-memory buffer, the same format
/// `save` writes to disk. Used to stream a full-resync payload to a replica
/// without touching the filesystem.
pub fn to_bytes(db: &Db) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    body.extend_from_slice(MAGIC);
    body.push(VERSION);

    for (key, slot) in db.snapshot() {
        encode_slot(&mut body, &key, &slot)?;
    }
    body.push(END_MARKER);

    let mut hasher = Hasher::new();
    hasher.update(&body);
    body.write_u32::<BigEndian>(hasher.finalize())?;
    Ok(body)
}

fn encode_slot(out: &mut Vec<u8>, key: &Bytes, slot: &Slot) -> Result<(), Error> {
    let tag = match &slot.value {
        Value::List(_) => TAG_LIST,
        Value::Set(_) => TAG_SET,
        Value::Hash(_) => TAG_HASH,
        Value::SortedSet(_) => TAG_SORTED_SET,
        Value::Stream(_) => TAG_STREAM,
        Value::Bitmap(_) => TAG_BITMAP,
        Value::Geo(_) => TAG_GEO,
        Value::Vector(_) => TAG_VECTOR,
        Value::TimeSeries(_) => TAG_TIMESERIES,
        _ => TAG_STRING,
    };
    out.push(tag);
    write_bytes(out, key)?;

    match &slot.value {
        Value::Blob(b) => write_bytes(out, b)?,
        Value::List(l) => {
            let l = l.read();
            out.write_u32::<BigEndian>(l.len() as u32)?;
            for item in l.iter() {
                write_bytes(out, item)?;
            }
        }
        Value::Set(s) => {
            let s = s.read();
            out.write_u32::<BigEndian>(s.len() as u32)?;
            for item in s.iter() {
                write_bytes(out, item)?;
            }
        }
        Value::Hash(h) => {
            let h = h.read();
            out.write_u32::<BigEndian>(h.len() as u32)?;
            for (field, value) in h.iter() {
                write_bytes(out, field)?;
                write_bytes(out, value)?;
            }
        }
        Value::SortedSet(z) => {
            let z = z.read();
            let members = z.get_values();
            out.write_u32::<BigEndian>(members.len() as u32)?;
            for member in &members {
                write_bytes(out, member)?;
                let score = z.get_score(member).map(|s| s.0).unwrap_or(0.0);
                out.write_f64::<BigEndian>(score)?;
            }
        }
        Value::Stream(s) => {
            let s = s.read();
            let entries = s.range(StreamId::MIN, StreamId::MAX, None);
            out.write_u32::<BigEndian>(entries.len() as u32)?;
            for entry in entries {
                out.write_u64::<BigEndian>(entry.id.ms)?;
                out.write_u64::<BigEndian>(entry.id.seq)?;
                out.write_u32::<BigEndian>(entry.fields.len() as u32)?;
                for (field, value) in entry.fields {
                    write_bytes(out, &field)?;
                    write_bytes(out, &value)?;
                }
            }
        }
        Value::Bitmap(b) => write_bytes(out, &b.read())?,
        Value::Geo(g) => {
            let g = g.read();
            out.write_u32::<BigEndian>(g.len() as u32)?;
            for (member, (lon, lat)) in g.iter() {
                write_bytes(out, member)?;
                out.write_f64::<BigEndian>(lon)?;
                out.write_f64::<BigEndian>(lat)?;
            }
        }
        Value::Vector(v) => {
            let v = v.read();
            out.write_u32::<BigEndian>(v.len() as u32)?;
            for x in v.iter() {
                out.write_f32::<BigEndian>(*x)?;
            }
        }
        Value::TimeSeries(t) => {
            let t = t.read();
            let samples = t.range(i64::MIN, i64::MAX, None);
            out.write_u32::<BigEndian>(samples.len() as u32)?;
            for sample in samples {
                out.write_i64::<BigEndian>(sample.timestamp)?;
                out.write_f64::<BigEndian>(sample.value)?;
            }
        }
        _ => write_bytes(out, &[])?,
    }

    out.write_i64::<BigEndian>(slot.expire_at.unwrap_or(0))?;
    Ok(())
}

/// Loads `path`, returning the entries the caller should install via
/// `Db::replace_all`. Returns an empty vec if the file doesn't exist.
pub fn load(path: &Path) -> Result<Vec<(Bytes, Slot)>, Error> {
    let contents = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    from_bytes(&contents)
}

/// Deserializes a buffer in `to_bytes`'s format. Used both by `load` and by
/// a replica applying a full-resync payload received from its primary.
pub fn from_bytes(contents: &[u8]) -> Result<Vec<(Bytes, Slot)>, Error> {
    if contents.len() < MAGIC.len() + 1 + 4 {
        return Err(Error::Config("rdb file truncated".into()));
    }
    let (body, crc_bytes) = contents.split_at(contents.len() - 4);
    let expected_crc = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != expected_crc {
        return Err(Error::Config("rdb checksum mismatch".into()));
    }

    let mut cursor = Cursor::new(body);
    let mut magic = [0u8; 8];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::Config("rdb magic mismatch".into()));
    }
    let version = cursor.read_u8()?;
    if version != VERSION {
        return Err(Error::Config(format!("unsupported rdb version {}", version)));
    }

    let mut out = Vec::new();
    loop {
        let tag = cursor.read_u8()?;
        if tag == END_MARKER {
            break;
        }
        let key = read_bytes(&mut cursor)?;
        let value = decode_value(tag, &mut cursor)?;
        let expire_raw = cursor.read_i64::<BigEndian>()?;
        let slot = Slot {
            value,
            expire_at: if expire_raw == 0 { None } else { Some(expire_raw) },
            version: 0,
        };
        out.push((key, slot));
    }
    Ok(out)
}

fn decode_value(tag: u8, cursor: &mut Cursor<&[u8]>) -> Result<Value, Error> {
    Ok(match tag {
        TAG_STRING => Value::Blob(BytesMut::from(read_bytes(cursor)?.as_ref())),
        TAG_LIST => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut list = VecDeque::with_capacity(n as usize);
            for _ in 0..n {
                list.push_back(read_bytes(cursor)?);
            }
            Value::from(list)
        }
        TAG_SET => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut set = HashSet::with_capacity(n as usize);
            for _ in 0..n {
                set.insert(read_bytes(cursor)?);
            }
            Value::from(set)
        }
        TAG_HASH => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut map = HashMap::with_capacity(n as usize);
            for _ in 0..n {
                let field = read_bytes(cursor)?;
                let value = read_bytes(cursor)?;
                map.insert(field, value);
            }
            Value::from(map)
        }
        TAG_SORTED_SET => {
            use crate::value::sorted_set::IOption;
            use float_ord::FloatOrd;
            let n = cursor.read_u32::<BigEndian>()?;
            let mut zset = SortedSet::new();
            let opt = IOption::default();
            for _ in 0..n {
                let member = read_bytes(cursor)?;
                let score = cursor.read_f64::<BigEndian>()?;
                zset.insert(FloatOrd(score), member, &opt);
            }
            Value::from(zset)
        }
        TAG_STREAM => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut stream = Stream::new();
            for _ in 0..n {
                let ms = cursor.read_u64::<BigEndian>()?;
                let seq = cursor.read_u64::<BigEndian>()?;
                let field_count = cursor.read_u32::<BigEndian>()?;
                let mut fields = Vec::with_capacity(field_count as usize);
                for _ in 0..field_count {
                    let field = read_bytes(cursor)?;
                    let value = read_bytes(cursor)?;
                    fields.push((field, value));
                }
                stream.add(StreamId { ms, seq }, fields)?;
            }
            Value::from(stream)
        }
        TAG_BITMAP => Value::Bitmap(crate::value::locked::Value::new(BytesMut::from(read_bytes(cursor)?.as_ref()))),
        TAG_GEO => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut geo = GeoSet::new();
            for _ in 0..n {
                let member = read_bytes(cursor)?;
                let lon = cursor.read_f64::<BigEndian>()?;
                let lat = cursor.read_f64::<BigEndian>()?;
                geo.add(member, lon, lat)?;
            }
            Value::from(geo)
        }
        TAG_VECTOR => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut v = Vec::with_capacity(n as usize);
            for _ in 0..n {
                v.push(cursor.read_f32::<BigEndian>()?);
            }
            Value::from(v)
        }
        TAG_TIMESERIES => {
            let n = cursor.read_u32::<BigEndian>()?;
            let mut ts = TimeSeries::new();
            for _ in 0..n {
                let timestamp = cursor.read_i64::<BigEndian>()?;
                let value = cursor.read_f64::<BigEndian>()?;
                ts.add(Sample { timestamp, value })?;
            }
            Value::from(ts)
        }
        other => return Err(Error::Config(format!("unknown rdb type tag {}", other))),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::DEFAULT_VECTOR_DIM;
    use std::collections::VecDeque as Deque;

    #[test]
    fn round_trips_a_mixed_keyspace() {
        let dir = std::env::temp_dir().join("keyspaced-rdb-test-roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dump.rdb");

        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripe(b"str", |map| {
            map.insert(Bytes::from("str"), Slot::new(Value::new(b"hello")));
        });
        let mut list = Deque::new();
        list.push_back(Bytes::from("a"));
        list.push_back(Bytes::from("b"));
        db.with_stripe(b"list", |map| {
            let mut slot = Slot::new(Value::from(list));
            slot.expire_at = Some(crate::time::now_millis() + 1_000_000);
            map.insert(Bytes::from("list"), slot);
        });

        save(&db, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(2, loaded.len());

        let db2 = Db::new(4, DEFAULT_VECTOR_DIM);
        db2.replace_all(loaded);
        assert!(db2.exists(b"str"));
        assert!(db2.exists(b"list"));
        assert!(db2.ttl_millis(b"list").flatten().is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let path = std::env::temp_dir().join("keyspaced-rdb-test-missing.rdb");
        std::fs::remove_file(&path).ok();
        assert_eq!(0, load(&path).unwrap().len());
    }
}
