//! Append-only stream commands.
use super::{next_arg, parse_usize};
use crate::{
    db::{Db, Slot},
    error::Error,
    time::now_millis,
    value::{
        locked,
        stream::{Entry, Stream, StreamId},
        Value,
    },
};
use bytes::Bytes;
use std::collections::VecDeque;

fn as_stream(value: &Value) -> Result<&locked::Value<Stream>, Error> {
    match value {
        Value::Stream(s) => Ok(s),
        _ => Err(Error::WrongType),
    }
}

fn render_entry(entry: &Entry) -> Value {
    let mut fields = Vec::with_capacity(entry.fields.len() * 2);
    for (f, v) in &entry.fields {
        fields.push(Value::Blob(f.as_ref().into()));
        fields.push(Value::Blob(v.as_ref().into()));
    }
    Value::Array(vec![Value::Blob(entry.id.to_string().into_bytes().into()), Value::Array(fields)])
}

pub fn xadd(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "xadd")?;
    let id_arg = next_arg(args, "xadd")?;
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(Error::Syntax("xadd".into()));
    }
    let fields: Vec<(Bytes, Bytes)> = args
        .drain(..)
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect();
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(Stream::new())));
        let stream = as_stream(&slot.value)?;
        let mut stream = stream.write();
        let id = if id_arg.as_ref() == b"*" {
            stream.next_id(now_millis() as u64)
        } else {
            StreamId::parse(&id_arg)?
        };
        let id = stream.add(id, fields)?;
        drop(stream);
        slot.bump();
        Ok(Value::Blob(id.to_string().into_bytes().into()))
    })
}

fn parse_range_id(bytes: &Bytes) -> Result<StreamId, Error> {
    StreamId::parse(bytes)
}

fn range(db: &Db, args: &mut VecDeque<Bytes>, command: &str, reverse: bool) -> Result<Value, Error> {
    let key = next_arg(args, command)?;
    let (start_arg, end_arg) = (next_arg(args, command)?, next_arg(args, command)?);
    let count = match (args.pop_front(), args.pop_front()) {
        (Some(opt), Some(n)) if opt.eq_ignore_ascii_case(b"COUNT") => Some(parse_usize(&n)?),
        _ => None,
    };
    let start = parse_range_id(&start_arg)?;
    let end = parse_range_id(&end_arg)?;
    db.with_stripe(&key, |map| {
        let entries = match map.get(key.as_ref()) {
            Some(slot) => {
                let stream = as_stream(&slot.value)?.read();
                if reverse {
                    stream.range_rev(start, end, count)
                } else {
                    stream.range(start, end, count)
                }
            }
            None => Vec::new(),
        };
        Ok(Value::Array(entries.iter().map(render_entry).collect()))
    })
}

pub fn xrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    range(db, args, "xrange", false)
}

pub fn xrevrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    range(db, args, "xrevrange", true)
}

pub fn xlen(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "xlen")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(as_stream(&slot.value)?.read().len())),
        None => Ok(Value::Integer(0)),
    })
}

/// `XREAD streams k1 k2 … id1 id2 … [COUNT n]` — returns entries strictly
/// greater than each supplied id, one array entry per key that has results.
pub fn xread(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let count = match (args.front().cloned(), args.len() >= 2) {
        (Some(opt), true) if opt.eq_ignore_ascii_case(b"COUNT") => {
            args.pop_front();
            Some(parse_usize(&next_arg(args, "xread")?)?)
        }
        _ => None,
    };
    let streams_tok = next_arg(args, "xread")?;
    if !streams_tok.eq_ignore_ascii_case(b"STREAMS") {
        return Err(Error::Syntax("xread".into()));
    }
    let rest: Vec<Bytes> = args.drain(..).collect();
    if rest.len() % 2 != 0 {
        return Err(Error::Syntax("xread".into()));
    }
    let n = rest.len() / 2;
    let keys = &rest[..n];
    let ids = &rest[n..];
    let mut out = Vec::new();
    for (key, id) in keys.iter().zip(ids.iter()) {
        let after = StreamId::parse(id)?;
        let entries = db.with_stripe(key, |map| -> Result<Vec<Entry>, Error> {
            match map.get(key.as_ref()) {
                Some(slot) => Ok(as_stream(&slot.value)?.read().after(after, count)),
                None => Ok(Vec::new()),
            }
        })?;
        if !entries.is_empty() {
            out.push(Value::Array(vec![
                Value::Blob(key.as_ref().into()),
                Value::Array(entries.iter().map(render_entry).collect()),
            ]));
        }
    }
    Ok(Value::Array(out))
}

#[cfg(test)]
mod test {
    use super::*;

    fn db() -> Db {
        Db::new(4, crate::db::DEFAULT_VECTOR_DIM)
    }

    fn args(words: &[&str]) -> VecDeque<Bytes> {
        words.iter().map(|w| Bytes::copy_from_slice(w.as_bytes())).collect()
    }

    #[test]
    fn xadd_rejects_non_monotonic_id() {
        let db = db();
        xadd(&db, &mut args(&["s", "1-0", "f", "v"])).unwrap();
        assert_eq!(
            Err(Error::StreamIdNotMonotonic),
            xadd(&db, &mut args(&["s", "1-0", "f", "v"]))
        );
    }

    #[test]
    fn xadd_auto_id_and_xrange() {
        let db = db();
        xadd(&db, &mut args(&["s", "1-0", "f", "v"])).unwrap();
        xadd(&db, &mut args(&["s", "*", "f", "v2"])).unwrap();
        let out = xrange(&db, &mut args(&["s", "-", "+"])).unwrap();
        if let Value::Array(entries) = out {
            assert_eq!(2, entries.len());
        } else {
            panic!("expected array");
        }
        assert_eq!(Value::Integer(2), xlen(&db, &mut args(&["s"])).unwrap());
    }

    #[test]
    fn xread_returns_strictly_newer_entries() {
        let db = db();
        xadd(&db, &mut args(&["s", "1-0", "f", "v"])).unwrap();
        xadd(&db, &mut args(&["s", "2-0", "f", "v"])).unwrap();
        let out = xread(&db, &mut args(&["STREAMS", "s", "1-0"])).unwrap();
        if let Value::Array(streams) = out {
            assert_eq!(1, streams.len());
        } else {
            panic!("expected array");
        }
    }
}
