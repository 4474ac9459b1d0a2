//! `SET`, `GET`, and the rest of the string-family commands. The "string"
//! slot is stored directly as `Value::Blob`.
use super::{next_arg, parse_f64, parse_i64};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{expiration::Expiration, float::Float, Value},
};
use bytes::{Bytes, BytesMut};
use std::{collections::VecDeque, convert::TryInto};

fn as_blob(value: &Value) -> Result<&BytesMut, Error> {
    match value {
        Value::Blob(b) => Ok(b),
        _ => Err(Error::WrongType),
    }
}

pub fn set(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "set")?;
    let value = next_arg(args, "set")?;

    let mut nx = false;
    let mut xx = false;
    let mut keepttl = false;
    let mut expire_at: Option<i64> = None;

    while let Some(opt) = args.pop_front() {
        match String::from_utf8_lossy(&opt).to_uppercase().as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "KEEPTTL" => keepttl = true,
            "EX" => {
                let secs = next_arg(args, "set")?;
                let exp = Expiration::new(&secs, false, false, b"set")?;
                let d: std::time::Duration = exp.try_into()?;
                expire_at = Some(crate::time::now_millis() + d.as_millis() as i64);
            }
            "PX" => {
                let millis = next_arg(args, "set")?;
                let exp = Expiration::new(&millis, true, false, b"set")?;
                let d: std::time::Duration = exp.try_into()?;
                expire_at = Some(crate::time::now_millis() + d.as_millis() as i64);
            }
            _ => return Err(Error::Syntax("set".into())),
        }
    }
    if nx && xx {
        return Err(Error::OptsNotCompatible("NX and XX".into()));
    }

    db.with_stripe(&key, |map| {
        let exists = map.contains_key(key.as_ref());
        if (nx && exists) || (xx && !exists) {
            return Ok(Value::Null);
        }
        let prior_ttl = if keepttl {
            map.get(key.as_ref()).and_then(|s| s.expire_at)
        } else {
            None
        };
        let mut slot = Slot::new(Value::Blob(BytesMut::from(value.as_ref())));
        slot.expire_at = expire_at.or(prior_ttl);
        if let Some(existing) = map.get(key.as_ref()) {
            slot.version = existing.version;
        }
        slot.bump();
        map.insert(key.clone(), slot);
        Ok(Value::Ok)
    })
}

pub fn get(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "get")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => as_blob(&slot.value).map(|b| Value::Blob(b.clone())),
        None => Ok(Value::Null),
    })
}

pub fn getset(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "getset")?;
    let value = next_arg(args, "getset")?;
    db.with_stripe(&key, |map| {
        let prior = match map.get(key.as_ref()) {
            Some(slot) => Some(as_blob(&slot.value)?.clone()),
            None => None,
        };
        let mut slot = Slot::new(Value::Blob(BytesMut::from(value.as_ref())));
        if let Some(existing) = map.get(key.as_ref()) {
            slot.version = existing.version;
        }
        slot.bump();
        map.insert(key.clone(), slot);
        Ok(prior.map(Value::Blob).unwrap_or(Value::Null))
    })
}

pub fn append(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "append")?;
    let suffix = next_arg(args, "append")?;
    db.with_stripe(&key, |map| {
        let slot = map.entry(key.clone()).or_insert_with(|| Slot::new(Value::Blob(BytesMut::new())));
        let blob = match &mut slot.value {
            Value::Blob(b) => b,
            _ => return Err(Error::WrongType),
        };
        blob.extend_from_slice(&suffix);
        let len = blob.len();
        slot.bump();
        Ok(Value::from(len))
    })
}

pub fn strlen(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "strlen")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => as_blob(&slot.value).map(|b| Value::from(b.len())),
        None => Ok(Value::Integer(0)),
    })
}

pub fn getrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "getrange")?;
    let start = parse_i64(&next_arg(args, "getrange")?)?;
    let end = parse_i64(&next_arg(args, "getrange")?)?;
    db.with_stripe(&key, |map| {
        let blob = match map.get(key.as_ref()) {
            Some(slot) => as_blob(&slot.value)?.clone(),
            None => return Ok(Value::Blob(BytesMut::new())),
        };
        let len = blob.len() as i64;
        if len == 0 {
            return Ok(Value::Blob(BytesMut::new()));
        }
        let start = super::normalize_index(start, blob.len()).clamp(0, len - 1);
        let end = super::normalize_index(end, blob.len()).clamp(0, len - 1);
        if start > end {
            return Ok(Value::Blob(BytesMut::new()));
        }
        Ok(Value::Blob(BytesMut::from(&blob[start as usize..=end as usize])))
    })
}

pub fn setrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "setrange")?;
    let offset = parse_i64(&next_arg(args, "setrange")?)?;
    let value = next_arg(args, "setrange")?;
    if offset < 0 {
        return Err(Error::OutOfRange);
    }
    let offset = offset as usize;
    db.with_stripe(&key, |map| {
        let slot = map.entry(key.clone()).or_insert_with(|| Slot::new(Value::Blob(BytesMut::new())));
        let blob = match &mut slot.value {
            Value::Blob(b) => b,
            _ => return Err(Error::WrongType),
        };
        if blob.len() < offset + value.len() {
            blob.resize(offset + value.len(), 0);
        }
        blob[offset..offset + value.len()].copy_from_slice(&value);
        let len = blob.len();
        slot.bump();
        Ok(Value::from(len))
    })
}

fn incr_by(db: &Db, key: Bytes, by: i64) -> Result<Value, Error> {
    db.with_stripe(&key, |map| {
        if let Some(existing) = map.get(key.as_ref()) {
            if !matches!(existing.value, Value::Blob(_)) {
                return Err(Error::WrongType);
            }
        }
        let slot = map.entry(key.clone()).or_insert_with(|| Slot::new(Value::Blob(BytesMut::from("0"))));
        let current: i64 = (&slot.value).try_into().map_err(|_| Error::NotANumber)?;
        let next = current.checked_add(by).ok_or(Error::Overflow)?;
        slot.value = Value::Blob(BytesMut::from(next.to_string().as_str()));
        slot.bump();
        Ok(Value::Integer(next))
    })
}

pub fn incr(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "incr")?;
    incr_by(db, key, 1)
}

pub fn decr(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "decr")?;
    incr_by(db, key, -1)
}

pub fn incrby(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "incrby")?;
    let by = parse_i64(&next_arg(args, "incrby")?)?;
    incr_by(db, key, by)
}

pub fn decrby(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "decrby")?;
    let by = parse_i64(&next_arg(args, "decrby")?)?;
    incr_by(db, key, -by)
}

pub fn incrbyfloat(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "incrbyfloat")?;
    let by = parse_f64(&next_arg(args, "incrbyfloat")?)?;
    db.with_stripe(&key, |map| {
        if let Some(existing) = map.get(key.as_ref()) {
            if !matches!(existing.value, Value::Blob(_)) {
                return Err(Error::WrongType);
            }
        }
        let slot = map.entry(key.clone()).or_insert_with(|| Slot::new(Value::Blob(BytesMut::from("0"))));
        let current: Float = (&slot.value).try_into().map_err(|_| Error::NotFloat)?;
        use num_traits::CheckedAdd;
        let next = current.checked_add(&Float::from(by)).ok_or(Error::Overflow)?;
        slot.value = Value::Blob(BytesMut::from(next.to_string().as_str()));
        slot.bump();
        Ok(Value::Float(*next))
    })
}

pub fn mget(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let keys: Vec<Bytes> = args.drain(..).collect();
    let out = keys
        .iter()
        .map(|key| {
            db.with_stripe(key, |map| match map.get(key.as_ref()) {
                Some(slot) => as_blob(&slot.value).map(|b| Value::Blob(b.clone())).unwrap_or(Value::Null),
                None => Value::Null,
            })
        })
        .collect();
    Ok(Value::Array(out))
}

pub fn mset(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    if args.len() % 2 != 0 || args.is_empty() {
        return Err(Error::Syntax("mset".into()));
    }
    while !args.is_empty() {
        let key = next_arg(args, "mset")?;
        let value = next_arg(args, "mset")?;
        db.with_stripe(&key, |map| {
            let mut slot = Slot::new(Value::Blob(BytesMut::from(value.as_ref())));
            if let Some(existing) = map.get(key.as_ref()) {
                slot.version = existing.version;
            }
            slot.bump();
            map.insert(key.clone(), slot);
        });
    }
    Ok(Value::Ok)
}

pub fn msetnx(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    if args.len() % 2 != 0 || args.is_empty() {
        return Err(Error::Syntax("msetnx".into()));
    }
    let pairs: Vec<(Bytes, Bytes)> = args
        .drain(..)
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect();
    let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| k.as_ref()).collect();
    let done = db.with_stripes(&keys, |db, guards| {
        let idxs = db.sorted_stripe_idxs(&keys);
        let any_exists = pairs.iter().any(|(k, _)| db.stripe_of(guards, &idxs, k).contains_key(k.as_ref()));
        if any_exists {
            return false;
        }
        for (k, v) in &pairs {
            let mut slot = Slot::new(Value::Blob(BytesMut::from(v.as_ref())));
            slot.bump();
            db.stripe_of(guards, &idxs, k).insert(k.clone(), slot);
        }
        true
    });
    Ok(Value::Integer(done as i64))
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
    fn set_then_get() {
        let db = db();
        assert_eq!(Value::Ok, set(&db, &mut args(&["foo", "bar"])).unwrap());
        assert_eq!(Value::Blob("bar".into()), get(&db, &mut args(&["foo"])).unwrap());
    }

    #[test]
    fn set_nx_fails_when_present() {
        let db = db();
        set(&db, &mut args(&["foo", "bar"])).unwrap();
        assert_eq!(Value::Null, set(&db, &mut args(&["foo", "baz", "NX"])).unwrap());
        assert_eq!(Value::Blob("bar".into()), get(&db, &mut args(&["foo"])).unwrap());
    }

    #[test]
    fn incr_creates_and_increments() {
        let db = db();
        assert_eq!(Value::Integer(1), incr(&db, &mut args(&["counter"])).unwrap());
        assert_eq!(Value::Integer(6), incrby(&db, &mut args(&["counter", "5"])).unwrap());
    }

    #[test]
    fn append_and_strlen() {
        let db = db();
        append(&db, &mut args(&["s", "hello"])).unwrap();
        assert_eq!(Value::Integer(10), append(&db, &mut args(&["s", "world"])).unwrap());
        assert_eq!(Value::Integer(10), strlen(&db, &mut args(&["s"])).unwrap());
    }

    #[test]
    fn setrange_zero_fills_gap() {
        let db = db();
        setrange(&db, &mut args(&["s", "5", "hi"])).unwrap();
        let v = get(&db, &mut args(&["s"])).unwrap();
        assert_eq!(Value::Blob(BytesMut::from(&b"\0\0\0\0\0hi"[..])), v);
    }

    #[test]
    fn msetnx_is_all_or_nothing() {
        let db = db();
        set(&db, &mut args(&["a", "1"])).unwrap();
        let result = msetnx(&db, &mut args(&["a", "x", "b", "y"])).unwrap();
        assert_eq!(Value::Integer(0), result);
        assert_eq!(Value::Null, get(&db, &mut args(&["b"])).unwrap());
    }
}
