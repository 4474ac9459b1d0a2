//! Sorted set commands: member -> score, ordered by (score, member).
use super::{next_arg, parse_f64, parse_i64};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{
        locked,
        sorted_set::{IOption, IResult, SortedSet},
        Value,
    },
};
use bytes::Bytes;
use float_ord::FloatOrd;
use std::collections::VecDeque;

fn as_zset(value: &Value) -> Result<&locked::Value<SortedSet>, Error> {
    match value {
        Value::SortedSet(z) => Ok(z),
        _ => Err(Error::WrongType),
    }
}

pub fn zadd(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "zadd")?;
    let opts = IOption::new(args)?;
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(Error::Syntax("zadd".into()));
    }
    let pairs: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(SortedSet::new())));
        let zset = as_zset(&slot.value)?;
        let mut zset = zset.write();
        let mut changed = 0i64;
        let mut last_score = 0.0;
        for pair in pairs.chunks(2) {
            let score = parse_f64(&pair[0])?;
            match zset.insert(FloatOrd(score), pair[1].clone(), &opts) {
                IResult::Inserted => changed += 1,
                IResult::Updated if opts.return_change => changed += 1,
                IResult::Updated | IResult::NoOp => {}
            }
            last_score = zset.get_score(&pair[1]).map(|s| s.0).unwrap_or(score);
        }
        let is_empty = zset.is_empty();
        drop(zset);
        slot.bump();
        if is_empty {
            map.remove(key.as_ref());
        }
        if opts.incr {
            Ok(Value::Float(last_score))
        } else {
            Ok(Value::Integer(changed))
        }
    })
}

pub fn zrem(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "zrem")?;
    if args.is_empty() {
        return Err(Error::Syntax("zrem".into()));
    }
    let members: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let should_delete;
        let removed = match map.get(key.as_ref()) {
            Some(slot) => {
                let zset = as_zset(&slot.value)?;
                let mut zset = zset.write();
                let mut removed = 0i64;
                for member in &members {
                    if zset.remove(member).is_some() {
                        removed += 1;
                    }
                }
                should_delete = zset.is_empty();
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

pub fn zcard(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "zcard")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(as_zset(&slot.value)?.read().len())),
        None => Ok(Value::Integer(0)),
    })
}

pub fn zscore(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "zscore")?;
    let member = next_arg(args, "zscore")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(as_zset(&slot.value)?
            .read()
            .get_score(&member)
            .map(|s| Value::Float(s.0))
            .unwrap_or(Value::Null)),
        None => Ok(Value::Null),
    })
}

pub fn zincrby(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "zincrby")?;
    let increment = parse_f64(&next_arg(args, "zincrby")?)?;
    let member = next_arg(args, "zincrby")?;
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(SortedSet::new())));
        let zset = as_zset(&slot.value)?;
        let mut zset = zset.write();
        zset.insert(FloatOrd(increment), member.clone(), &IOption::incr());
        let new_score = zset.get_score(&member).map(|s| s.0).unwrap_or(increment);
        drop(zset);
        slot.bump();
        Ok(Value::Float(new_score))
    })
}

pub fn zcount(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    use std::ops::Bound;
    let key = next_arg(args, "zcount")?;
    let min = parse_f64(&next_arg(args, "zcount")?)?;
    let max = parse_f64(&next_arg(args, "zcount")?)?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::from(
            as_zset(&slot.value)?
                .read()
                .count_values_by_score_range(Bound::Included(FloatOrd(min)), Bound::Included(FloatOrd(max))),
        )),
        None => Ok(Value::Integer(0)),
    })
}

fn rank(db: &Db, args: &mut VecDeque<Bytes>, command: &str, reverse: bool) -> Result<Value, Error> {
    let key = next_arg(args, command)?;
    let member = next_arg(args, command)?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => {
            let zset = as_zset(&slot.value)?.read();
            match zset.get_value_pos(&member) {
                Some(pos) => {
                    let pos = if reverse { zset.len() - 1 - pos } else { pos };
                    Ok(Value::from(pos))
                }
                None => Ok(Value::Null),
            }
        }
        None => Ok(Value::Null),
    })
}

pub fn zrank(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    rank(db, args, "zrank", false)
}

pub fn zrevrank(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    rank(db, args, "zrevrank", true)
}

fn has_withscores(args: &mut VecDeque<Bytes>) -> bool {
    if args.back().map(|a| a.eq_ignore_ascii_case(b"WITHSCORES")).unwrap_or(false) {
        args.pop_back();
        true
    } else {
        false
    }
}

fn range(db: &Db, args: &mut VecDeque<Bytes>, command: &str, reverse: bool) -> Result<Value, Error> {
    let key = next_arg(args, command)?;
    let start = parse_i64(&next_arg(args, command)?)?;
    let stop = parse_i64(&next_arg(args, command)?)?;
    let withscores = has_withscores(args);
    db.with_stripe(&key, |map| {
        let zset = match map.get(key.as_ref()) {
            Some(slot) => as_zset(&slot.value)?.read().clone(),
            None => return Ok(Value::Array(Vec::new())),
        };
        let mut members = zset.get_values();
        if reverse {
            members.reverse();
        }
        let len = members.len() as i64;
        if len == 0 {
            return Ok(Value::Array(Vec::new()));
        }
        let start = super::normalize_index(start, members.len()).clamp(0, len - 1);
        let stop = super::normalize_index(stop, members.len()).clamp(-1, len - 1);
        if start > stop {
            return Ok(Value::Array(Vec::new()));
        }
        let mut out = Vec::new();
        for member in members
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
        {
            let score = zset.get_score(&member).map(|s| s.0).unwrap_or(0.0);
            out.push(Value::Blob(member.as_ref().into()));
            if withscores {
                out.push(Value::Float(score));
            }
        }
        Ok(Value::Array(out))
    })
}

pub fn zrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    range(db, args, "zrange", false)
}

pub fn zrevrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    range(db, args, "zrevrange", true)
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
    fn zadd_orders_by_score_then_member() {
        let db = db();
        zadd(&db, &mut args(&["z", "1", "a"])).unwrap();
        zadd(&db, &mut args(&["z", "2", "b"])).unwrap();
        zadd(&db, &mut args(&["z", "1", "c"])).unwrap();
        assert_eq!(
            Value::Array(blobs(&["a", "c", "b"])),
            zrange(&db, &mut args(&["z", "0", "-1"])).unwrap()
        );
    }

    #[test]
    fn zrange_withscores() {
        let db = db();
        zadd(&db, &mut args(&["z", "1", "a"])).unwrap();
        let out = zrange(&db, &mut args(&["z", "0", "-1", "WITHSCORES"])).unwrap();
        assert_eq!(Value::Array(vec![Value::Blob("a".into()), Value::Float(1.0)]), out);
    }

    #[test]
    fn zrem_emptying_removes_key() {
        let db = db();
        zadd(&db, &mut args(&["z", "1", "a"])).unwrap();
        zrem(&db, &mut args(&["z", "a"])).unwrap();
        assert!(!db.exists(b"z"));
    }

    #[test]
    fn zincrby_creates_and_increments() {
        let db = db();
        assert_eq!(Value::Float(5.0), zincrby(&db, &mut args(&["z", "5", "a"])).unwrap());
        assert_eq!(Value::Float(7.0), zincrby(&db, &mut args(&["z", "2", "a"])).unwrap());
    }
}
