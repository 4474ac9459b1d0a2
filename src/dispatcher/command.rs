//! The shape of one registered verb: its handler, arity, and the metadata
//! the dispatch loop and `COMMAND`-style introspection need around it.
use crate::{db::Db, error::Error, value::Value};
use bytes::Bytes;
use metered::{ErrorCount, HitCount, InFlight, ResponseTime, Throughput};
use serde::Serialize;
use std::collections::VecDeque;

pub type Handler = fn(&Db, &mut VecDeque<Bytes>) -> Result<Value, Error>;

/// Minimum argument count a verb accepts, not counting the verb itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(want) => n == want,
            Arity::AtLeast(min) => n >= min,
        }
    }
}

/// Coarse authorization bucket, mirroring the teacher's `Flag::Write` /
/// `Flag::ReadOnly` / `Flag::Admin` split without carrying its whole tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCategory {
    Read,
    Write,
    Admin,
}

/// Per-command hit/error/latency counters, sampled for the Prometheus export
/// in `server::server_metrics`. Field shape mirrors what a `metered`-style
/// registry tracks per measured function.
#[derive(Debug, Default, Serialize)]
pub struct Metrics {
    pub hit_count: HitCount,
    pub error_count: ErrorCount,
    pub in_flight: InFlight,
    pub response_time: ResponseTime,
    pub throughput: Throughput,
}

pub struct Command {
    pub name: &'static str,
    pub handler: Handler,
    pub arity: Arity,
    /// Mutators get their post-commit hooks run (AOF append, replica fan-out)
    /// on success, and are rejected outright on a read-only replica.
    pub is_mutator: bool,
    pub auth: AuthCategory,
}

impl Command {
    pub const fn new(name: &'static str, handler: Handler, arity: Arity, is_mutator: bool, auth: AuthCategory) -> Self {
        Self {
            name,
            handler,
            arity,
            is_mutator,
            auth,
        }
    }

    pub fn check_arity(&self, args_len: usize) -> Result<(), Error> {
        if self.arity.accepts(args_len) {
            Ok(())
        } else {
            Err(Error::Syntax(self.name.to_lowercase()))
        }
    }
}
