//! Field -> value map commands.
use super::next_arg;
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{locked, Value},
};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

fn as_hash(value: &Value) -> Result<&locked::Value<HashMap<Bytes, Bytes>>, Error> {
    match value {
        Value::Hash(h) => Ok(h),
        _ => Err(Error::WrongType),
    }
}

pub fn hset(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hset")?;
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(Error::Syntax("hset".into()));
    }
    let pairs: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(HashMap::new())));
        let hash = as_hash(&slot.value)?;
        let mut hash = hash.write();
        let mut added = 0i64;
        for pair in pairs.chunks(2) {
            if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                added += 1;
            }
        }
        drop(hash);
        slot.bump();
        Ok(Value::Integer(added))
    })
}

pub fn hget(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hget")?;
    let field = next_arg(args, "hget")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(as_hash(&slot.value)?.read().get(field.as_ref()))),
        None => Ok(Value::Null),
    })
}

pub fn hgetall(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hgetall")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => {
            let hash = as_hash(&slot.value)?.read();
            let mut out = Vec::with_capacity(hash.len() * 2);
            for (field, value) in hash.iter() {
                out.push(Value::Blob(field.as_ref().into()));
                out.push(Value::Blob(value.as_ref().into()));
            }
            Ok(Value::Array(out))
        }
        None => Ok(Value::Array(Vec::new())),
    })
}

pub fn hdel(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hdel")?;
    if args.is_empty() {
        return Err(Error::Syntax("hdel".into()));
    }
    let fields: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let should_delete;
        let removed = match map.get(key.as_ref()) {
            Some(slot) => {
                let hash = as_hash(&slot.value)?;
                let mut hash = hash.write();
                let mut removed = 0i64;
                for field in &fields {
                    if hash.remove(field.as_ref()).is_some() {
                        removed += 1;
                    }
                }
                should_delete = hash.is_empty();
                removed
            }
            None => {
                should_delete = false;
                0
            }
        };
        if should_delete {
            map.remove(key.as_ref());
        } else if let Some(slot) = map.get_mut(key.as_ref()) {
            if removed > 0 {
                slot.bump();
            }
        }
        Ok(Value::Integer(removed))
    })
}

pub fn hexists(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hexists")?;
    let field = next_arg(args, "hexists")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(
            as_hash(&slot.value)?.read().contains_key(field.as_ref()) as usize,
        )),
        None => Ok(Value::Integer(0)),
    })
}

pub fn hkeys(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hkeys")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::Array(
            as_hash(&slot.value)?
                .read()
                .keys()
                .map(|k| Value::Blob(k.as_ref().into()))
                .collect(),
        )),
        None => Ok(Value::Array(Vec::new())),
    })
}

pub fn hvals(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hvals")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::Array(
            as_hash(&slot.value)?
                .read()
                .values()
                .map(|v| Value::Blob(v.as_ref().into()))
                .collect(),
        )),
        None => Ok(Value::Array(Vec::new())),
    })
}

pub fn hlen(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "hlen")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(as_hash(&slot.value)?.read().len())),
        None => Ok(Value::Integer(0)),
    })
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
    fn hset_hget_hdel() {
        let db = db();
        assert_eq!(Value::Integer(2), hset(&db, &mut args(&["h", "a", "1", "b", "2"])).unwrap());
        assert_eq!(Value::Blob("1".into()), hget(&db, &mut args(&["h", "a"])).unwrap());
        assert_eq!(Value::Integer(1), hdel(&db, &mut args(&["h", "a"])).unwrap());
        assert_eq!(Value::Null, hget(&db, &mut args(&["h", "a"])).unwrap());
    }

    #[test]
    fn hdel_emptying_removes_key() {
        let db = db();
        hset(&db, &mut args(&["h", "a", "1"])).unwrap();
        hdel(&db, &mut args(&["h", "a"])).unwrap();
        assert!(!db.exists(b"h"));
    }

    #[test]
    fn hlen_on_missing_key_is_zero() {
        let db = db();
        assert_eq!(Value::Integer(0), hlen(&db, &mut args(&["missing"])).unwrap());
    }
}
