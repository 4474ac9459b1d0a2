//! Append-only, non-decreasing-timestamp sample series.
use super::{next_arg, parse_f64, parse_i64, parse_usize};
use crate::{
    db::{Db, Slot},
    error::Error,
    time::now_millis,
    value::{
        locked,
        timeseries::{Aggregate, Sample, TimeSeries},
        Value,
    },
};
use bytes::Bytes;
use std::collections::VecDeque;

fn as_timeseries(value: &Value) -> Result<&locked::Value<TimeSeries>, Error> {
    match value {
        Value::TimeSeries(t) => Ok(t),
        _ => Err(Error::WrongType),
    }
}

pub fn tsadd(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "tsadd")?;
    let value = parse_f64(&next_arg(args, "tsadd")?)?;
    let timestamp = match args.pop_front() {
        Some(t) => parse_i64(&t)?,
        None => now_millis(),
    };
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::from(TimeSeries::new())));
        let ts = as_timeseries(&slot.value)?;
        let mut ts = ts.write();
        ts.add(Sample { timestamp, value })?;
        drop(ts);
        slot.bump();
        Ok(Value::Integer(timestamp))
    })
}

pub fn tsget(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "tsget")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(as_timeseries(&slot.value)?
            .read()
            .last()
            .map(|s| Value::Array(vec![Value::Integer(s.timestamp), Value::Float(s.value)]))
            .unwrap_or(Value::Null)),
        None => Ok(Value::Null),
    })
}

pub fn tsrange(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "tsrange")?;
    let start = parse_i64(&next_arg(args, "tsrange")?)?;
    let end = parse_i64(&next_arg(args, "tsrange")?)?;
    let count = match (args.pop_front(), args.pop_front()) {
        (Some(opt), Some(n)) if opt.eq_ignore_ascii_case(b"COUNT") => Some(parse_usize(&n)?),
        _ => None,
    };
    db.with_stripe(&key, |map| {
        let samples = match map.get(key.as_ref()) {
            Some(slot) => as_timeseries(&slot.value)?.read().range(start, end, count),
            None => Vec::new(),
        };
        Ok(Value::Array(
            samples
                .into_iter()
                .map(|s| Value::Array(vec![Value::Integer(s.timestamp), Value::Float(s.value)]))
                .collect(),
        ))
    })
}

pub fn tsaggregate(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "tsaggregate")?;
    let op = Aggregate::parse(&next_arg(args, "tsaggregate")?)?;
    let start = parse_i64(&next_arg(args, "tsaggregate")?)?;
    let end = parse_i64(&next_arg(args, "tsaggregate")?)?;
    let bucket = parse_i64(&next_arg(args, "tsaggregate")?)?;
    db.with_stripe(&key, |map| {
        let buckets = match map.get(key.as_ref()) {
            Some(slot) => as_timeseries(&slot.value)?.read().aggregate(op, start, end, bucket),
            None => Vec::new(),
        };
        Ok(Value::Array(
            buckets
                .into_iter()
                .map(|(t, v)| Value::Array(vec![Value::Integer(t), Value::Float(v)]))
                .collect(),
        ))
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
    fn tsadd_rejects_out_of_order_timestamp() {
        let db = db();
        tsadd(&db, &mut args(&["t", "1.0", "10"])).unwrap();
        assert_eq!(Err(Error::OutOfOrderTimestamp), tsadd(&db, &mut args(&["t", "2.0", "5"])));
    }

    #[test]
    fn tsget_returns_last_sample() {
        let db = db();
        tsadd(&db, &mut args(&["t", "1.0", "10"])).unwrap();
        tsadd(&db, &mut args(&["t", "2.0", "20"])).unwrap();
        assert_eq!(
            Value::Array(vec![Value::Integer(20), Value::Float(2.0)]),
            tsget(&db, &mut args(&["t"])).unwrap()
        );
    }

    #[test]
    fn tsaggregate_buckets_by_window() {
        let db = db();
        tsadd(&db, &mut args(&["t", "1.0", "0"])).unwrap();
        tsadd(&db, &mut args(&["t", "2.0", "1"])).unwrap();
        tsadd(&db, &mut args(&["t", "3.0", "10"])).unwrap();
        let out = tsaggregate(&db, &mut args(&["t", "sum", "0", "11", "10"])).unwrap();
        assert_eq!(
            Value::Array(vec![
                Value::Array(vec![Value::Integer(0), Value::Float(3.0)]),
                Value::Array(vec![Value::Integer(10), Value::Float(3.0)]),
            ]),
            out
        );
    }
}
