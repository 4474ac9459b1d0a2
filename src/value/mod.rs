//! All typed values the keyspace can hold, plus the wire encoding for them.
pub mod expiration;
pub mod float;
pub mod geo;
pub mod locked;
pub mod sorted_set;
pub mod stream;
pub mod timeseries;
pub mod vector;

use crate::error::Error;
use bytes::{Bytes, BytesMut};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    convert::{TryFrom, TryInto},
    str::FromStr,
};

/// A value held by the keyspace, and the shape of every response rendered
/// to the wire.
///
/// Collection types carry a `locked::Value<T>` wrapper so a clone of the
/// enum (e.g. a snapshot reference) still observes live mutations made
/// through the slot lock.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    /// Hash field -> value map
    Hash(locked::Value<HashMap<Bytes, Bytes>>),
    /// Double-ended list of byte strings
    List(locked::Value<VecDeque<Bytes>>),
    /// Unordered set of unique byte strings
    Set(locked::Value<HashSet<Bytes>>),
    /// Member -> score, ordered by (score, member)
    SortedSet(locked::Value<sorted_set::SortedSet>),
    /// Append-only sequence of (id, field map) entries
    Stream(locked::Value<stream::Stream>),
    /// Bit-addressable byte array
    Bitmap(locked::Value<BytesMut>),
    /// Member -> (longitude, latitude)
    Geo(locked::Value<geo::GeoSet>),
    /// Fixed-dimension float vector
    Vector(locked::Value<Vec<f32>>),
    /// Ordered (timestamp, value) samples
    TimeSeries(locked::Value<timeseries::TimeSeries>),
    /// Vector/Array of values, used for wire responses
    Array(Vec<Value>),
    /// Bytes/Strings/Binary data; also the storage for the "string" type
    Blob(BytesMut),
    /// A short textual status (e.g. `+OK`) or simple string value
    String(String),
    /// An error: (tag, message)
    Err(String, String),
    /// Integer
    Integer(i64),
    /// Boolean
    Boolean(bool),
    /// Float number
    Float(f64),
    /// Big number
    BigInteger(i128),
    /// Null / nil
    Null,
    /// Ok
    Ok,
    /// Empty response that is not sent to the client
    Ignore,
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl Value {
    /// Creates a new Blob value from a stream of bytes.
    pub fn new(value: &[u8]) -> Self {
        Self::Blob(value.into())
    }

    /// The `TYPE` command's name for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hash(_) => "hash",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::SortedSet(_) => "zset",
            Self::Stream(_) => "stream",
            Self::Bitmap(_) => "bitmap",
            Self::Geo(_) => "geo",
            Self::Vector(_) => "vector",
            Self::TimeSeries(_) => "timeseries",
            _ => "string",
        }
    }

    /// Is the current value an error?
    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err(..))
    }
}

impl From<&Value> for Vec<u8> {
    fn from(value: &Value) -> Vec<u8> {
        match value {
            Value::Ignore => b"".to_vec(),
            Value::Null => b"$-1\r\n".to_vec(),
            Value::Array(x) => {
                let mut s: Vec<u8> = format!("*{}\r\n", x.len()).into();
                for i in x.iter() {
                    let b: Vec<u8> = i.into();
                    s.extend(b);
                }
                s
            }
            Value::Integer(x) => format!(":{}\r\n", x).into(),
            Value::BigInteger(x) => format!("({}\r\n", x).into(),
            Value::Float(x) => format!(",{}\r\n", x).into(),
            Value::Blob(x) => {
                let mut s: BytesMut = format!("${}\r\n", x.len()).as_bytes().into();
                s.extend_from_slice(x);
                s.extend_from_slice(b"\r\n");
                s.to_vec()
            }
            Value::Err(x, y) => format!("-{} {}\r\n", x, y).into(),
            Value::String(x) => format!("+{}\r\n", x).into(),
            Value::Boolean(x) => {
                if *x {
                    "#t\r\n".into()
                } else {
                    "#f\r\n".into()
                }
            }
            Value::Ok => "+OK\r\n".into(),
            _ => b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec(),
        }
    }
}

impl TryFrom<&Value> for i64 {
    type Error = Error;

    fn try_from(val: &Value) -> Result<Self, Self::Error> {
        match val {
            Value::BigInteger(x) => (*x).try_into().map_err(|_| Error::NotANumber),
            Value::Integer(x) => Ok(*x),
            Value::Blob(x) => bytes_to_number::<i64>(x),
            Value::String(x) => x.parse::<i64>().map_err(|_| Error::NotANumber),
            _ => Err(Error::NotANumber),
        }
    }
}

impl TryFrom<&Value> for f64 {
    type Error = Error;

    fn try_from(val: &Value) -> Result<Self, Self::Error> {
        match val {
            Value::Float(x) => Ok(*x),
            Value::Blob(x) => bytes_to_number::<f64>(x),
            Value::String(x) => x.parse::<f64>().map_err(|_| Error::NotANumber),
            _ => Err(Error::NotANumber),
        }
    }
}

/// Tries to convert bytes data into a number.
#[inline]
pub fn bytes_to_number<T: FromStr>(bytes: &[u8]) -> Result<T, Error> {
    let x = String::from_utf8_lossy(bytes);
    x.parse::<T>().map_err(|_| Error::NotANumber)
}

/// Tries to convert bytes data into an integer, naming the expected type in the error.
#[inline]
pub fn bytes_to_int<T: FromStr>(bytes: &[u8]) -> Result<T, Error> {
    let x = String::from_utf8_lossy(bytes);
    x.parse::<T>()
        .map_err(|_| Error::NotANumberType("an integer".to_owned()))
}

crate::macros::value_try_from!(f64, Value::Float);
crate::macros::value_try_from!(i32, Value::Integer);
crate::macros::value_try_from!(u32, Value::Integer);
crate::macros::value_try_from!(i64, Value::Integer);
crate::macros::value_try_from!(i128, Value::BigInteger);

impl From<usize> for Value {
    fn from(value: usize) -> Value {
        Value::Integer(value as i64)
    }
}

impl From<Value> for Vec<u8> {
    fn from(value: Value) -> Vec<u8> {
        (&value).into()
    }
}

impl From<Option<&Bytes>> for Value {
    fn from(v: Option<&Bytes>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<&Bytes> for Value {
    fn from(v: &Bytes) -> Self {
        Value::new(v)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::Blob(value.as_bytes().into())
    }
}

impl From<HashMap<Bytes, Bytes>> for Value {
    fn from(value: HashMap<Bytes, Bytes>) -> Value {
        Value::Hash(locked::Value::new(value))
    }
}

impl From<VecDeque<Bytes>> for Value {
    fn from(value: VecDeque<Bytes>) -> Value {
        Value::List(locked::Value::new(value))
    }
}

impl From<HashSet<Bytes>> for Value {
    fn from(value: HashSet<Bytes>) -> Value {
        Value::Set(locked::Value::new(value))
    }
}

impl From<sorted_set::SortedSet> for Value {
    fn from(value: sorted_set::SortedSet) -> Value {
        Value::SortedSet(locked::Value::new(value))
    }
}

impl From<stream::Stream> for Value {
    fn from(value: stream::Stream) -> Value {
        Value::Stream(locked::Value::new(value))
    }
}

impl From<geo::GeoSet> for Value {
    fn from(value: geo::GeoSet) -> Value {
        Value::Geo(locked::Value::new(value))
    }
}

impl From<timeseries::TimeSeries> for Value {
    fn from(value: timeseries::TimeSeries) -> Value {
        Value::TimeSeries(locked::Value::new(value))
    }
}

impl From<Vec<f32>> for Value {
    fn from(value: Vec<f32>) -> Value {
        Value::Vector(locked::Value::new(value))
    }
}

crate::macros::value_vec_try_from!(&str);

impl From<String> for Value {
    fn from(value: String) -> Value {
        value.as_str().into()
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::Array(value)
    }
}

impl TryInto<Vec<Value>> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Vec<Value>, Self::Error> {
        match self {
            Self::Array(x) => Ok(x),
            _ => Err(Error::Internal),
        }
    }
}
