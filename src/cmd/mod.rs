//! Type-operation families. Each module implements one data type's
//! commands as free functions over `&Db`, returning a `Value` to render.
pub mod bitmap;
pub mod geo;
pub mod hash;
pub mod key;
pub mod list;
pub mod server;
pub mod set;
pub mod stream;
pub mod string;
pub mod timeseries;
pub mod vector;
pub mod zset;

use crate::error::Error;
use bytes::Bytes;
use std::collections::VecDeque;

pub(crate) fn next_arg(args: &mut VecDeque<Bytes>, command: &str) -> Result<Bytes, Error> {
    args.pop_front().ok_or_else(|| Error::Syntax(command.to_owned()))
}

pub(crate) fn parse_i64(bytes: &Bytes) -> Result<i64, Error> {
    crate::value::bytes_to_number(bytes)
}

pub(crate) fn parse_usize(bytes: &Bytes) -> Result<usize, Error> {
    parse_i64(bytes)?.try_into().map_err(|_| Error::NotANumber)
}

pub(crate) fn parse_f64(bytes: &Bytes) -> Result<f64, Error> {
    crate::value::bytes_to_number(bytes)
}

/// Resolves a possibly-negative index (relative to the end) into an
/// in-range `[0, len)` index, or `None` if it is out of range after
/// clamping the way `LRANGE`/`ZRANGE` expect.
pub(crate) fn normalize_index(idx: i64, len: usize) -> i64 {
    if idx < 0 {
        idx + len as i64
    } else {
        idx
    }
}
