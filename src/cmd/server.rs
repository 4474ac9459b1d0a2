//! Ambient server-introspection verbs not tied to a particular value type.
use crate::{db::Db, error::Error, time::now, value::Value};
use bytes::Bytes;
use git_version::git_version;
use std::collections::VecDeque;

pub fn ping(_db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    match args.pop_front() {
        Some(payload) => Ok(Value::Blob(payload.as_ref().into())),
        None => Ok(Value::String("PONG".into())),
    }
}

pub fn dbsize(db: &Db, _args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    Ok(Value::from(db.dbsize()))
}

pub fn time(_db: &Db, _args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let now = now();
    Ok(Value::Array(vec![
        Value::Blob(now.as_secs().to_string().into_bytes().into()),
        Value::Blob(now.subsec_micros().to_string().into_bytes().into()),
    ]))
}

pub fn flushall(db: &Db, _args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    db.replace_all(Vec::new());
    Ok(Value::Ok)
}

pub fn info(db: &Db, _args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let body = format!(
        "# Server\r\nkeyspaced_version:{}\r\nkeyspaced_git_sha1:{}\r\n# Keyspace\r\ndb0:keys={}\r\n",
        env!("CARGO_PKG_VERSION"),
        git_version!(),
        db.dbsize()
    );
    Ok(Value::Blob(body.into_bytes().into()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn db() -> Db {
        Db::new(4, crate::db::DEFAULT_VECTOR_DIM)
    }

    #[test]
    fn ping_defaults_to_pong() {
        let db = db();
        assert_eq!(Value::String("PONG".into()), ping(&db, &mut VecDeque::new()).unwrap());
    }

    #[test]
    fn ping_echoes_payload() {
        let db = db();
        let mut args: VecDeque<Bytes> = vec![Bytes::from("hi")].into();
        assert_eq!(Value::Blob("hi".into()), ping(&db, &mut args).unwrap());
    }

    #[test]
    fn dbsize_reports_key_count() {
        let db = db();
        db.with_stripe(b"k", |map| {
            map.insert(Bytes::from("k"), crate::db::Slot::new(Value::new(b"v")));
        });
        assert_eq!(Value::Integer(1), dbsize(&db, &mut VecDeque::new()).unwrap());
    }
}
