//! Deserializer for the `directive arg1 arg2 ...` config file format used by
//! the keyspace server, built on top of `serde`.

pub mod de;
mod parser;

pub use de::{from_slice, from_str, Deserializer, Error};
pub use parser::{Args, ConfigValue, Error as ParseError};
