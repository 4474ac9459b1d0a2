//! Geospatial member -> coordinate commands.
use super::{next_arg, parse_f64};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{
        geo::{GeoSet, Unit},
        locked, Value,
    },
};
use bytes::Bytes;
use std::collections::VecDeque;

fn as_geo(value: &Value) -> Result<&locked::Value<GeoSet>, Error> {
    match value {
        Value::Geo(g) => Ok(g),
        _ => Err(Error::WrongType),
    }
}

pub fn geoadd(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "geoadd")?;
    if args.is_empty() || args.len() % 3 != 0 {
        return Err(Error::Syntax("geoadd".into()));
    }
    let triples: Vec<Bytes> = args.drain(..).collect();
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(GeoSet::new())));
        let geo = as_geo(&slot.value)?;
        let mut geo = geo.write();
        let mut added = 0i64;
        for triple in triples.chunks(3) {
            let lon = parse_f64(&triple[0])?;
            let lat = parse_f64(&triple[1])?;
            if geo.add(triple[2].clone(), lon, lat)? {
                added += 1;
            }
        }
        drop(geo);
        slot.bump();
        Ok(Value::Integer(added))
    })
}

pub fn geodist(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "geodist")?;
    let m1 = next_arg(args, "geodist")?;
    let m2 = next_arg(args, "geodist")?;
    let unit = match args.pop_front() {
        Some(u) => Unit::parse(&u)?,
        None => Unit::Meters,
    };
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(as_geo(&slot.value)?
            .read()
            .dist(&m1, &m2, unit)
            .map(Value::Float)
            .unwrap_or(Value::Null)),
        None => Ok(Value::Null),
    })
}

pub fn georadius(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "georadius")?;
    let lon = parse_f64(&next_arg(args, "georadius")?)?;
    let lat = parse_f64(&next_arg(args, "georadius")?)?;
    let radius = parse_f64(&next_arg(args, "georadius")?)?;
    let unit = Unit::parse(&next_arg(args, "georadius")?)?;
    db.with_stripe(&key, |map| {
        let hits = match map.get(key.as_ref()) {
            Some(slot) => as_geo(&slot.value)?.read().radius(lon, lat, radius, unit),
            None => Vec::new(),
        };
        Ok(Value::Array(hits.into_iter().map(|(m, _)| Value::Blob(m.as_ref().into())).collect()))
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
    fn geoadd_and_geodist() {
        let db = db();
        assert_eq!(
            Value::Integer(2),
            geoadd(&db, &mut args(&["g", "13.361389", "38.115556", "a", "15.087269", "37.502669", "b"])).unwrap()
        );
        let dist = geodist(&db, &mut args(&["g", "a", "b", "km"])).unwrap();
        match dist {
            Value::Float(d) => assert!((d - 166.27).abs() < 1.0),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn geodist_missing_member_is_nil() {
        let db = db();
        geoadd(&db, &mut args(&["g", "0", "0", "a"])).unwrap();
        assert_eq!(Value::Null, geodist(&db, &mut args(&["g", "a", "b"])).unwrap());
    }

    #[test]
    fn geoadd_rejects_out_of_range() {
        let db = db();
        assert_eq!(
            Err(Error::GeoRange(200.0, 0.0)),
            geoadd(&db, &mut args(&["g", "200", "0", "a"]))
        );
    }
}
