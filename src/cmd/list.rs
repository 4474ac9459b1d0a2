//! Double-ended list commands.
use super::{next_arg, parse_i64, parse_usize};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{locked, Value},
};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

fn as_list(value: &Value) -> Result<&locked::Value<VecDeque<Bytes>>, Error> {
    match value {
        Value::List(l) => Ok(l),
        _ => Err(Error::WrongType),
    }
}

fn push(db: &Db, args: &mut VecDeque<Bytes>, front: bool, command: &str) -> Result<Value, Error> {
    let key = next_arg(args, command)?;
    if args.is_empty() {
        return Err(Error::Syntax(command.to_owned()));
    }
    let values: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map: &mut HashMap<Bytes, Slot>| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(VecDeque::new())));
        let list = as_list(&slot.value)?;
        let mut list = list.write();
        for v in values {
            if front {
                list.push_front(v);
            } else {
                list.push_back(v);
            }
        }
        let len = list.len();
        drop(list);
        slot.bump();
        Ok(Value::from(len))
    })
}

pub fn lpush(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    push(db, args, true, "lpush")
}

pub fn rpush(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    push(db, args, false, "rpush")
}

fn pop(db: &Db, args: &mut VecDeque<Bytes>, front: bool, command: &str) -> Result<Value, Error> {
    let key = next_arg(args, command)?;
    let count = match args.pop_front() {
        Some(c) => Some(parse_usize(&c)?),
        None => None,
    };
    db.with_stripe(&key, |map| {
        let should_delete;
        let result = match map.get(key.as_ref()) {
            Some(slot) => {
                let list = as_list(&slot.value)?;
                let mut list = list.write();
                let n = count.unwrap_or(1);
                let mut popped = Vec::new();
                for _ in 0..n {
                    let item = if front { list.pop_front() } else { list.pop_back() };
                    match item {
                        Some(v) => popped.push(v),
                        None => break,
                    }
                }
                should_delete = list.is_empty();
                match count {
                    None => popped
                        .into_iter()
                        .next()
                        .map(|v| Value::Blob(v.as_ref().into()))
                        .unwrap_or(Value::Null),
                    Some(_) => Value::Array(popped.into_iter().map(|v| Value::Blob(v.as_ref().into())).collect()),
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

pub fn lpop(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    pop(db, args, true, "lpop")
}

pub fn rpop(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    pop(db, args, false, "rpop")
}

pub fn lrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "lrange")?;
    let start = parse_i64(&next_arg(args, "lrange")?)?;
    let stop = parse_i64(&next_arg(args, "lrange")?)?;
    db.with_stripe(&key, |map| {
        let list = match map.get(key.as_ref()) {
            Some(slot) => as_list(&slot.value)?.read().clone(),
            None => return Ok(Value::Array(Vec::new())),
        };
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Value::Array(Vec::new()));
        }
        let start = super::normalize_index(start, list.len()).clamp(0, len - 1);
        let stop = super::normalize_index(stop, list.len()).clamp(-1, len - 1);
        if start > stop {
            return Ok(Value::Array(Vec::new()));
        }
        let out = list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|v| Value::Blob(v.as_ref().into()))
            .collect();
        Ok(Value::Array(out))
    })
}

pub fn lindex(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "lindex")?;
    let idx = parse_i64(&next_arg(args, "lindex")?)?;
    db.with_stripe(&key, |map| {
        let list = match map.get(key.as_ref()) {
            Some(slot) => as_list(&slot.value)?.read().clone(),
            None => return Ok(Value::Null),
        };
        let idx = super::normalize_index(idx, list.len());
        if idx < 0 || idx as usize >= list.len() {
            return Ok(Value::Null);
        }
        Ok(Value::Blob(list[idx as usize].as_ref().into()))
    })
}

pub fn lset(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "lset")?;
    let idx = parse_i64(&next_arg(args, "lset")?)?;
    let value = next_arg(args, "lset")?;
    db.with_stripe(&key, |map| {
        let slot = map.get_mut(key.as_ref()).ok_or(Error::OutOfRange)?;
        let list = as_list(&slot.value)?;
        let mut list = list.write();
        let idx = super::normalize_index(idx, list.len());
        if idx < 0 || idx as usize >= list.len() {
            return Err(Error::OutOfRange);
        }
        list[idx as usize] = value;
        drop(list);
        slot.bump();
        Ok(Value::Ok)
    })
}

pub fn ltrim(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "ltrim")?;
    let start = parse_i64(&next_arg(args, "ltrim")?)?;
    let stop = parse_i64(&next_arg(args, "ltrim")?)?;
    db.with_stripe(&key, |map| {
        let should_delete = match map.get(key.as_ref()) {
            Some(slot) => {
                let list = as_list(&slot.value)?;
                let mut list = list.write();
                let len = list.len() as i64;
                if len == 0 {
                    true
                } else {
                    let start = super::normalize_index(start, list.len()).clamp(0, len - 1);
                    let stop = super::normalize_index(stop, list.len()).clamp(-1, len - 1);
                    let kept: VecDeque<Bytes> = if start > stop {
                        VecDeque::new()
                    } else {
                        list.iter()
                            .skip(start as usize)
                            .take((stop - start + 1) as usize)
                            .cloned()
                            .collect()
                    };
                    let empty = kept.is_empty();
                    *list = kept;
                    empty
                }
            }
            None => false,
        };
        if should_delete {
            map.remove(key.as_ref());
        } else if let Some(slot) = map.get_mut(key.as_ref()) {
            slot.bump();
        }
        Ok(Value::Ok)
    })
}

pub fn llen(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "llen")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => as_list(&slot.value).map(|l| Value::from(l.read().len())),
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

    fn blobs(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::Blob((*v).into())).collect()
    }

    #[test]
    fn lpush_lrange_rpop_llen() {
        let db = db();
        lpush(&db, &mut args(&["L", "a", "b", "c"])).unwrap();
        assert_eq!(
            Value::Array(blobs(&["c", "b", "a"])),
            lrange(&db, &mut args(&["L", "0", "-1"])).unwrap()
        );
        assert_eq!(Value::Blob("a".into()), rpop(&db, &mut args(&["L"])).unwrap());
        assert_eq!(Value::Integer(2), llen(&db, &mut args(&["L"])).unwrap());
    }

    #[test]
    fn popping_to_empty_deletes_key() {
        let db = db();
        lpush(&db, &mut args(&["L", "a"])).unwrap();
        rpop(&db, &mut args(&["L"])).unwrap();
        assert!(!db.exists(b"L"));
    }

    #[test]
    fn lset_out_of_range() {
        let db = db();
        lpush(&db, &mut args(&["L", "a"])).unwrap();
        assert_eq!(Err(Error::OutOfRange), lset(&db, &mut args(&["L", "5", "x"])));
    }
}
