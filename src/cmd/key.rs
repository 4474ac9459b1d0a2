//! Type-agnostic key-management verbs.
use super::{next_arg, parse_i64};
use crate::{db::Db, error::Error, time::now_millis, value::Value};
use bytes::Bytes;
use std::collections::VecDeque;

pub fn del(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::Syntax("del".into()));
    }
    let mut count = 0i64;
    for key in args.drain(..) {
        if db.delete(&key) {
            count += 1;
        }
    }
    Ok(Value::Integer(count))
}

pub fn exists(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::Syntax("exists".into()));
    }
    let count = args.drain(..).filter(|key| db.exists(key)).count();
    Ok(Value::from(count))
}

pub fn type_of(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "type")?;
    Ok(Value::String(db.type_name(&key).unwrap_or("none").to_owned()))
}

pub fn expire(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "expire")?;
    let seconds = parse_i64(&next_arg(args, "expire")?)?;
    let ok = db.set_expire_at(&key, now_millis() + seconds * 1000);
    Ok(Value::Integer(ok as i64))
}

pub fn persist(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "persist")?;
    Ok(Value::Integer(db.clear_expire(&key) as i64))
}

pub fn ttl(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "ttl")?;
    let seconds = match db.ttl_millis(&key) {
        None => -2,
        Some(None) => -1,
        Some(Some(millis)) => (millis as f64 / 1000.0).ceil() as i64,
    };
    Ok(Value::Integer(seconds))
}

pub fn keys(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let pattern = next_arg(args, "keys")?;
    let pattern = String::from_utf8_lossy(&pattern).into_owned();
    Ok(Value::Array(
        db.keys_matching(&pattern).into_iter().map(|k| Value::Blob(k.as_ref().into())).collect(),
    ))
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
    fn ttl_reports_absent_and_no_expiry() {
        let db = db();
        assert_eq!(Value::Integer(-2), ttl(&db, &mut args(&["missing"])).unwrap());
        db.with_stripe(b"k", |map| {
            map.insert(Bytes::from("k"), crate::db::Slot::new(Value::new(b"v")));
        });
        assert_eq!(Value::Integer(-1), ttl(&db, &mut args(&["k"])).unwrap());
    }

    #[test]
    fn expire_then_persist() {
        let db = db();
        db.with_stripe(b"k", |map| {
            map.insert(Bytes::from("k"), crate::db::Slot::new(Value::new(b"v")));
        });
        assert_eq!(Value::Integer(1), expire(&db, &mut args(&["k", "10"])).unwrap());
        assert_eq!(Value::Integer(1), persist(&db, &mut args(&["k"])).unwrap());
        assert_eq!(Value::Integer(-1), ttl(&db, &mut args(&["k"])).unwrap());
    }

    #[test]
    fn type_of_and_exists() {
        let db = db();
        assert_eq!(Value::String("none".into()), type_of(&db, &mut args(&["missing"])).unwrap());
        db.with_stripe(b"k", |map| {
            map.insert(Bytes::from("k"), crate::db::Slot::new(Value::new(b"v")));
        });
        assert_eq!(Value::String("string".into()), type_of(&db, &mut args(&["k"])).unwrap());
        assert_eq!(Value::Integer(1), exists(&db, &mut args(&["k", "missing"])).unwrap());
    }
}
