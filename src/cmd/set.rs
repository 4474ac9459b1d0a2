//! Unordered set commands.
use super::{next_arg, parse_usize};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{locked, Value},
};
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet, VecDeque};

fn as_set(value: &Value) -> Result<&locked::Value<HashSet<Bytes>>, Error> {
    match value {
        Value::Set(s) => Ok(s),
        _ => Err(Error::WrongType),
    }
}

pub fn sadd(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "sadd")?;
    if args.is_empty() {
        return Err(Error::Syntax("sadd".into()));
    }
    let members: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(HashSet::new())));
        let set = as_set(&slot.value)?;
        let mut set = set.write();
        let mut added = 0i64;
        for member in members {
            if set.insert(member) {
                added += 1;
            }
        }
        drop(set);
        slot.bump();
        Ok(Value::Integer(added))
    })
}

pub fn srem(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "srem")?;
    if args.is_empty() {
        return Err(Error::Syntax("srem".into()));
    }
    let members: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let should_delete;
        let removed = match map.get(key.as_ref()) {
            Some(slot) => {
                let set = as_set(&slot.value)?;
                let mut set = set.write();
                let mut removed = 0i64;
                for member in &members {
                    if set.remove(member.as_ref()) {
                        removed += 1;
                    }
                }
                should_delete = set.is_empty();
                removed
            }
            None => {
                should_delete = false;
                0
            }
        };
        if should_delete {
            map.remove(key.as_ref());
        } else if removed > 0 {
            map.get_mut(key.as_ref()).unwrap().bump();
        }
        Ok(Value::Integer(removed))
    })
}

pub fn smembers(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "smembers")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::Array(
            as_set(&slot.value)?
                .read()
                .iter()
                .map(|m| Value::Blob(m.as_ref().into()))
                .collect(),
        )),
        None => Ok(Value::Array(Vec::new())),
    })
}

pub fn sismember(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "sismember")?;
    let member = next_arg(args, "sismember")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(
            as_set(&slot.value)?.read().contains(member.as_ref()) as usize,
        )),
        None => Ok(Value::Integer(0)),
    })
}

pub fn scard(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "scard")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(as_set(&slot.value)?.read().len())),
        None => Ok(Value::Integer(0)),
    })
}

pub fn spop(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "spop")?;
    let count = match args.pop_front() {
        Some(c) => Some(parse_usize(&c)?),
        None => None,
    };
    let mut rng = rand::thread_rng();
    db.with_stripe(&key, |map| {
        let should_delete;
        let result = match map.get(key.as_ref()) {
            Some(slot) => {
                let set = as_set(&slot.value)?;
                let mut set = set.write();
                let n = count.unwrap_or(1);
                let picked: Vec<Bytes> = set.iter().cloned().choose_multiple(&mut rng, n);
                for member in &picked {
                    set.remove(member);
                }
                should_delete = set.is_empty();
                match count {
                    None => picked
                        .into_iter()
                        .next()
                        .map(|v| Value::Blob(v.as_ref().into()))
                        .unwrap_or(Value::Null),
                    Some(_) => Value::Array(picked.into_iter().map(|v| Value::Blob(v.as_ref().into())).collect()),
                }
            }
            None => {
                should_delete = false;
                match count {
                    None => Value::Null,
                    Some(_) => Value::Array(Vec::new()),
                }
            }
        };
        if should_delete {
            map.remove(key.as_ref());
        } else if map.contains_key(key.as_ref()) {
            map.get_mut(key.as_ref()).unwrap().bump();
        }
        Ok(result)
    })
}

pub fn srandmember(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "srandmember")?;
    let count = match args.pop_front() {
        Some(c) => Some(parse_usize(&c)?),
        None => None,
    };
    let mut rng = rand::thread_rng();
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => {
            let set = as_set(&slot.value)?.read();
            let n = count.unwrap_or(1);
            let picked: Vec<Bytes> = set.iter().cloned().choose_multiple(&mut rng, n);
            match count {
                None => Ok(picked
                    .into_iter()
                    .next()
                    .map(|v| Value::Blob(v.as_ref().into()))
                    .unwrap_or(Value::Null)),
                Some(_) => Ok(Value::Array(picked.into_iter().map(|v| Value::Blob(v.as_ref().into())).collect())),
            }
        }
        None => match count {
            None => Ok(Value::Null),
            Some(_) => Ok(Value::Array(Vec::new())),
        },
    })
}

fn read_set(map: &HashMap<Bytes, Slot>, key: &Bytes) -> Result<HashSet<Bytes>, Error> {
    match map.get(key.as_ref()) {
        Some(slot) => Ok(as_set(&slot.value)?.read().clone()),
        None => Ok(HashSet::new()),
    }
}

fn combine(
    db: &Db,
    args: &mut VecDeque<Bytes>,
    command: &str,
    op: fn(HashSet<Bytes>, &HashSet<Bytes>) -> HashSet<Bytes>,
) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::Syntax(command.to_owned()));
    }
    let keys: Vec<Bytes> = args.drain(..).collect();
    let key_refs: Vec<&[u8]> = keys.iter().map(|k| k.as_ref()).collect();
    db.with_stripes(&key_refs, |db, guards| {
        let idx = db.sorted_stripe_idxs(&key_refs);
        let mut sets = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            let map = db.stripe_of(guards, &idx, key.as_ref());
            sets.push(read_set(map, key)?);
        }
        let mut acc = sets.remove(0);
        for s in &sets {
            acc = op(acc, s);
        }
        Ok(Value::Array(acc.into_iter().map(|m| Value::Blob(m.as_ref().into())).collect()))
    })
}

pub fn sinter(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    combine(db, args, "sinter", |acc, s| acc.intersection(s).cloned().collect())
}

pub fn sunion(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    combine(db, args, "sunion", |acc, s| acc.union(s).cloned().collect())
}

pub fn sdiff(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    combine(db, args, "sdiff", |acc, s| acc.difference(s).cloned().collect())
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
    fn sadd_scard_sismember() {
        let db = db();
        assert_eq!(Value::Integer(2), sadd(&db, &mut args(&["s", "a", "b"])).unwrap());
        assert_eq!(Value::Integer(0), sadd(&db, &mut args(&["s", "a"])).unwrap());
        assert_eq!(Value::Integer(2), scard(&db, &mut args(&["s"])).unwrap());
        assert_eq!(Value::Integer(1), sismember(&db, &mut args(&["s", "a"])).unwrap());
    }

    #[test]
    fn srem_emptying_removes_key() {
        let db = db();
        sadd(&db, &mut args(&["s", "a"])).unwrap();
        srem(&db, &mut args(&["s", "a"])).unwrap();
        assert!(!db.exists(b"s"));
    }

    #[test]
    fn sinter_sunion_sdiff() {
        let db = db();
        sadd(&db, &mut args(&["a", "1", "2", "3"])).unwrap();
        sadd(&db, &mut args(&["b", "2", "3", "4"])).unwrap();
        let inter = sinter(&db, &mut args(&["a", "b"])).unwrap();
        if let Value::Array(items) = inter {
            assert_eq!(2, items.len());
        } else {
            panic!("expected array");
        }
    }
}
