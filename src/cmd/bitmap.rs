//! Bit-addressable byte array. Bit 0 is the least-significant bit of byte 0
//! (the LSB-of-byte-0 convention, fixed and invariant across this server).
use super::{next_arg, parse_i64, parse_usize};
use crate::{
    db::{Db, Slot},
    error::Error,
    value::Value,
};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

fn bit_at(bytes: &[u8], offset: usize) -> u8 {
    let byte_idx = offset / 8;
    let bit_idx = offset % 8;
    if byte_idx >= bytes.len() {
        0
    } else {
        (bytes[byte_idx] >> bit_idx) & 1
    }
}

fn set_bit_at(bytes: &mut BytesMut, offset: usize, value: u8) -> u8 {
    let byte_idx = offset / 8;
    let bit_idx = offset % 8;
    if byte_idx >= bytes.len() {
        bytes.resize(byte_idx + 1, 0);
    }
    let prior = (bytes[byte_idx] >> bit_idx) & 1;
    if value == 1 {
        bytes[byte_idx] |= 1 << bit_idx;
    } else {
        bytes[byte_idx] &= !(1 << bit_idx);
    }
    prior
}

/// Counts set bits, optionally restricted to a byte range (inclusive, may
/// be negative relative to the end, same semantics as `GETRANGE`).
pub fn count_ones(bytes: &[u8], range: Option<(i64, i64)>) -> usize {
    let slice = match range {
        None => bytes,
        Some((start, end)) => {
            if bytes.is_empty() {
                return 0;
            }
            let len = bytes.len() as i64;
            let start = super::normalize_index(start, bytes.len()).clamp(0, len - 1);
            let end = super::normalize_index(end, bytes.len()).clamp(0, len - 1);
            if start > end {
                return 0;
            }
            &bytes[start as usize..=end as usize]
        }
    };
    slice.iter().map(|b| b.count_ones() as usize).sum()
}

fn as_bitmap(value: &Value) -> Result<&crate::value::locked::Value<BytesMut>, Error> {
    match value {
        Value::Bitmap(b) => Ok(b),
        _ => Err(Error::WrongType),
    }
}

pub fn setbit(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "setbit")?;
    let offset = parse_usize(&next_arg(args, "setbit")?)?;
    let value = parse_usize(&next_arg(args, "setbit")?)?;
    if value > 1 {
        return Err(Error::Syntax("setbit".into()));
    }
    db.with_stripe(&key, |map| {
        let slot = map
            .entry(key.clone())
            .or_insert_with(|| Slot::new(Value::Bitmap(crate::value::locked::Value::new(BytesMut::new()))));
        let bitmap = as_bitmap(&slot.value)?;
        let prior = set_bit_at(&mut bitmap.write(), offset, value as u8);
        slot.bump();
        Ok(Value::Integer(prior as i64))
    })
}

pub fn getbit(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "getbit")?;
    let offset = parse_usize(&next_arg(args, "getbit")?)?;
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => as_bitmap(&slot.value).map(|b| Value::Integer(bit_at(&b.read(), offset) as i64)),
        None => Ok(Value::Integer(0)),
    })
}

pub fn bitcount(db: &Db, args: &mut VecDeque<Bytes>) -> Result<Value, Error> {
    let key = next_arg(args, "bitcount")?;
    let range = match (args.pop_front(), args.pop_front()) {
        (Some(start), Some(end)) => Some((parse_i64(&start)?, parse_i64(&end)?)),
        _ => None,
    };
    db.with_stripe(&key, |map| match map.get(key.as_ref()) {
        Some(slot) => as_bitmap(&slot.value).map(|b| Value::from(count_ones(&b.read(), range))),
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
    fn setbit_getbit_roundtrip() {
        let db = db();
        assert_eq!(Value::Integer(0), setbit(&db, &mut args(&["b", "7", "1"])).unwrap());
        assert_eq!(Value::Integer(1), getbit(&db, &mut args(&["b", "7"])).unwrap());
        assert_eq!(Value::Integer(1), bitcount(&db, &mut args(&["b"])).unwrap());
        assert_eq!(Value::Integer(1), setbit(&db, &mut args(&["b", "7", "0"])).unwrap());
        assert_eq!(Value::Integer(0), bitcount(&db, &mut args(&["b"])).unwrap());
    }

    #[test]
    fn getbit_past_end_is_zero_without_extending() {
        let db = db();
        assert_eq!(Value::Integer(0), getbit(&db, &mut args(&["b", "100"])).unwrap());
        assert!(!db.exists(b"b"));
    }
}
