//! Central error type shared by every subsystem.
//!
//! Internal code always returns `Error`; it is converted into the wire
//! `Value::Err(tag, message)` only at the dispatcher boundary.
use crate::value::Value;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum Error {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    Syntax(String),

    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("value is not an integer or out of range")]
    NotANumber,

    #[error("value is not an integer or out of range")]
    NotANumberType(String),

    #[error("value is not a valid float")]
    NotFloat,

    #[error("increment or decrement would overflow")]
    Overflow,

    #[error("index out of range")]
    OutOfRange,

    #[error("Authentication required")]
    NoAuth,

    #[error("operation not permitted")]
    Permission,

    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdNotMonotonic,

    #[error("sample timestamp is not newer than the last recorded sample")]
    OutOfOrderTimestamp,

    #[error("invalid longitude,latitude pair {0:.6},{1:.6}")]
    GeoRange(f64, f64),

    #[error("vector dimension mismatch: expected {0}, got {1}")]
    VectorDim(usize, usize),

    #[error("unknown similarity metric '{0}'")]
    UnknownMetric(String),

    #[error("unknown aggregation operator '{0}'")]
    UnknownAggregate(String),

    #[error("READONLY You can't write against a read only replica")]
    ReadOnlyReplica,

    #[error("options {0} are not compatible")]
    OptsNotCompatible(String),

    #[error("invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("internal error")]
    Internal,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Short wire-level tag, mirroring Redis's `-TAG message` convention.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) | Self::Syntax(_) => "ERR",
            Self::WrongType => "WRONGTYPE",
            Self::NotANumber | Self::NotANumberType(_) | Self::NotFloat | Self::Overflow => "ERR",
            Self::OutOfRange => "ERR",
            Self::NoAuth => "NOAUTH",
            Self::Permission => "NOPERM",
            Self::StreamIdNotMonotonic => "ERR",
            Self::OutOfOrderTimestamp => "ERR",
            Self::GeoRange(..) => "ERR",
            Self::VectorDim(..) => "ERR",
            Self::UnknownMetric(_) => "ERR",
            Self::UnknownAggregate(_) => "ERR",
            Self::ReadOnlyReplica => "READONLY",
            Self::OptsNotCompatible(_) => "ERR",
            Self::InvalidExpire(_) => "ERR",
            Self::Internal => "ERR",
            Self::Io(_) => "ERR",
            Self::Config(_) => "ERR",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<Error> for Value {
    fn from(e: Error) -> Self {
        Value::Err(e.tag().to_owned(), e.to_string())
    }
}
