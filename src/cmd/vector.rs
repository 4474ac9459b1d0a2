//! Fixed-dimension vector storage and brute-force similarity search.
use super::{next_arg, parse_f64, parse_usize};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::{
        locked,
        vector::{check_dim, Metric},
        Value,
    },
};
use bytes::Bytes;
use std::collections::VecDeque;

fn as_vector(value: &Value) -> Result<&locked::Value<Vec<f32>>, Error> {
    match value {
        Value::Vector(v) => Ok(v),
        _ => Err(Error::WrongType),
    }
}

pub fn vecadd(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "vecadd")?;
    if args.is_empty() {
        return Err(Error::Syntax("vecadd".into()));
    }
    let mut values = Vec::with_capacity(args.len());
    for raw in args.drain(..) {
        values.push(parse_f64(&raw)? as f32);
    }
    check_dim(&values, db.vector_dim())?;
    db.with_stripe(&key, |map| {
        map.insert(key.clone(), Slot::new(Value::from(values.clone())));
        Ok(Value::Ok)
    })
}

pub fn vecget(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "vecget")?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(Value::Array(
            as_vector(&slot.value)?
                .read()
                .iter()
                .map(|f| Value::Float(*f as f64))
                .collect(),
        )),
        None => Ok(Value::Null),
    })
}

/// `VECSEARCH query k_best [metric]` — brute-force scan over every vector
/// key, ranked by the metric (higher score is closer for every metric).
pub fn vecsearch(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "vecsearch")?;
    let k_best = parse_usize(&next_arg(args, "vecsearch")?)?;
    let metric = match args.pop_front() {
        Some(m) => Metric::parse(&m)?,
        None => Metric::Cosine,
    };
    let query = db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => Ok(as_vector(&slot.value)?.read().clone()),
        None => Ok(Vec::new()),
    })?;
    if query.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    let mut scored: Vec<(Bytes, f64)> = Vec::new();
    for (candidate_key, vector) in db.vectors_snapshot() {
        if candidate_key == key {
            continue;
        }
        let score = metric.score(&query, &vector);
        scored.push((candidate_key, score));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k_best);
    Ok(Value::Array(
        scored
            .into_iter()
            .map(|(k, score)| Value::Array(vec![Value::Blob(k.as_ref().into()), Value::Float(score)]))
            .collect(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    fn db() -> Db {
        Db::new(4, 3)
    }

    fn args(words: &[&str]) -> VecDeque<Bytes> {
        words.iter().map(|w| Bytes::copy_from_slice(w.as_bytes())).collect()
    }

    #[test]
    fn vecadd_rejects_wrong_dimension() {
        let db = db();
        assert_eq!(Err(Error::VectorDim(3, 2)), vecadd(&db, &mut args(&["v", "1", "2"])));
    }

    #[test]
    fn vecadd_and_vecget_roundtrip() {
        let db = db();
        vecadd(&db, &mut args(&["v", "1", "2", "3"])).unwrap();
        let out = vecget(&db, &mut args(&["v"])).unwrap();
        assert_eq!(
            Value::Array(vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]),
            out
        );
    }

    #[test]
    fn vecsearch_ranks_by_metric() {
        let db = db();
        vecadd(&db, &mut args(&["a", "1", "0", "0"])).unwrap();
        vecadd(&db, &mut args(&["b", "0", "1", "0"])).unwrap();
        vecadd(&db, &mut args(&["q", "1", "0", "0"])).unwrap();
        let out = vecsearch(&db, &mut args(&["q", "1", "cosine"])).unwrap();
        if let Value::Array(hits) = out {
            assert_eq!(1, hits.len());
        } else {
            panic!("expected array");
        }
    }
}
