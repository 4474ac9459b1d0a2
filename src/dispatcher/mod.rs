//! Verb lookup and the six-step request/response pipeline: look the verb up
//! in a static registry, authorize it, check its arity, invoke it, and -- for
//! mutators that committed successfully -- notify the persistence/replication
//! sinks registered against the server context.
pub mod command;

use crate::{cmd, db::Db, error::Error, value::Value};
use bytes::Bytes;
use command::{Arity, AuthCategory, Command, Metrics};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, VecDeque},
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};

/// Registered sorted by name; looked up with a binary search instead of a
/// runtime-built map or a big `match`.
pub static COMMANDS: &[Command] = &[
    Command::new("APPEND", cmd::string::append, Arity::Exact(2), true, AuthCategory::Write),
    Command::new("BITCOUNT", cmd::bitmap::bitcount, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("DBSIZE", cmd::server::dbsize, Arity::Exact(0), false, AuthCategory::Read),
    Command::new("DECR", cmd::string::decr, Arity::Exact(1), true, AuthCategory::Write),
    Command::new("DECRBY", cmd::string::decrby, Arity::Exact(2), true, AuthCategory::Write),
    Command::new("DEL", cmd::key::del, Arity::AtLeast(1), true, AuthCategory::Write),
    Command::new("EXISTS", cmd::key::exists, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("EXPIRE", cmd::key::expire, Arity::Exact(2), true, AuthCategory::Write),
    Command::new("FLUSHALL", cmd::server::flushall, Arity::Exact(0), true, AuthCategory::Admin),
    Command::new("GEOADD", cmd::geo::geoadd, Arity::AtLeast(4), true, AuthCategory::Write),
    Command::new("GEODIST", cmd::geo::geodist, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("GEORADIUS", cmd::geo::georadius, Arity::Exact(5), false, AuthCategory::Read),
    Command::new("GET", cmd::string::get, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("GETBIT", cmd::bitmap::getbit, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("GETRANGE", cmd::string::getrange, Arity::Exact(3), false, AuthCategory::Read),
    Command::new("GETSET", cmd::string::getset, Arity::Exact(2), true, AuthCategory::Write),
    Command::new("HDEL", cmd::hash::hdel, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("HEXISTS", cmd::hash::hexists, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("HGET", cmd::hash::hget, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("HGETALL", cmd::hash::hgetall, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("HKEYS", cmd::hash::hkeys, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("HLEN", cmd::hash::hlen, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("HSET", cmd::hash::hset, Arity::AtLeast(3), true, AuthCategory::Write),
    Command::new("HVALS", cmd::hash::hvals, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("INCR", cmd::string::incr, Arity::Exact(1), true, AuthCategory::Write),
    Command::new("INCRBY", cmd::string::incrby, Arity::Exact(2), true, AuthCategory::Write),
    Command::new("INCRBYFLOAT", cmd::string::incrbyfloat, Arity::Exact(2), true, AuthCategory::Write),
    Command::new("INFO", cmd::server::info, Arity::Exact(0), false, AuthCategory::Read),
    Command::new("KEYS", cmd::key::keys, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("LINDEX", cmd::list::lindex, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("LLEN", cmd::list::llen, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("LPOP", cmd::list::lpop, Arity::AtLeast(1), true, AuthCategory::Write),
    Command::new("LPUSH", cmd::list::lpush, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("LRANGE", cmd::list::lrange, Arity::Exact(3), false, AuthCategory::Read),
    Command::new("LSET", cmd::list::lset, Arity::Exact(3), true, AuthCategory::Write),
    Command::new("LTRIM", cmd::list::ltrim, Arity::Exact(3), true, AuthCategory::Write),
    Command::new("MGET", cmd::string::mget, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("MSET", cmd::string::mset, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("MSETNX", cmd::string::msetnx, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("PERSIST", cmd::key::persist, Arity::Exact(1), true, AuthCategory::Write),
    Command::new("PING", cmd::server::ping, Arity::AtLeast(0), false, AuthCategory::Read),
    Command::new("RPOP", cmd::list::rpop, Arity::AtLeast(1), true, AuthCategory::Write),
    Command::new("RPUSH", cmd::list::rpush, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("SADD", cmd::set::sadd, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("SCARD", cmd::set::scard, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("SDIFF", cmd::set::sdiff, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("SET", cmd::string::set, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("SETBIT", cmd::bitmap::setbit, Arity::Exact(3), true, AuthCategory::Write),
    Command::new("SETRANGE", cmd::string::setrange, Arity::Exact(3), true, AuthCategory::Write),
    Command::new("SINTER", cmd::set::sinter, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("SISMEMBER", cmd::set::sismember, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("SMEMBERS", cmd::set::smembers, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("SPOP", cmd::set::spop, Arity::AtLeast(1), true, AuthCategory::Write),
    Command::new("SRANDMEMBER", cmd::set::srandmember, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("SREM", cmd::set::srem, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("STRLEN", cmd::string::strlen, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("SUNION", cmd::set::sunion, Arity::AtLeast(1), false, AuthCategory::Read),
    Command::new("TIME", cmd::server::time, Arity::Exact(0), false, AuthCategory::Read),
    Command::new("TSADD", cmd::timeseries::tsadd, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("TSAGGREGATE", cmd::timeseries::tsaggregate, Arity::Exact(5), false, AuthCategory::Read),
    Command::new("TSGET", cmd::timeseries::tsget, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("TSRANGE", cmd::timeseries::tsrange, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("TTL", cmd::key::ttl, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("TYPE", cmd::key::type_of, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("VECADD", cmd::vector::vecadd, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("VECGET", cmd::vector::vecget, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("VECSEARCH", cmd::vector::vecsearch, Arity::AtLeast(2), false, AuthCategory::Read),
    Command::new("XADD", cmd::stream::xadd, Arity::AtLeast(4), true, AuthCategory::Write),
    Command::new("XLEN", cmd::stream::xlen, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("XRANGE", cmd::stream::xrange, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("XREAD", cmd::stream::xread, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("XREVRANGE", cmd::stream::xrevrange, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("ZADD", cmd::zset::zadd, Arity::AtLeast(3), true, AuthCategory::Write),
    Command::new("ZCARD", cmd::zset::zcard, Arity::Exact(1), false, AuthCategory::Read),
    Command::new("ZCOUNT", cmd::zset::zcount, Arity::Exact(3), false, AuthCategory::Read),
    Command::new("ZINCRBY", cmd::zset::zincrby, Arity::Exact(3), true, AuthCategory::Write),
    Command::new("ZRANGE", cmd::zset::zrange, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("ZRANK", cmd::zset::zrank, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("ZREM", cmd::zset::zrem, Arity::AtLeast(2), true, AuthCategory::Write),
    Command::new("ZREVRANGE", cmd::zset::zrevrange, Arity::AtLeast(3), false, AuthCategory::Read),
    Command::new("ZREVRANK", cmd::zset::zrevrank, Arity::Exact(2), false, AuthCategory::Read),
    Command::new("ZSCORE", cmd::zset::zscore, Arity::Exact(2), false, AuthCategory::Read),
];

pub fn lookup(verb: &str) -> Option<&'static Command> {
    COMMANDS.binary_search_by(|c| c.name.cmp(verb)).ok().map(|i| &COMMANDS[i])
}

/// Registered by persistence and replication at startup; notified after a
/// mutator commits so neither subsystem has to reach back into the
/// dispatcher or into each other.
pub trait PostCommitSink: Send + Sync {
    fn on_commit(&self, verb: &str, args: &[Bytes]);
}

/// Process-wide state every subsystem is handed explicitly, instead of
/// reaching for statics: the keyspace, the registered commit sinks, the
/// replica-read-only flag, and a per-command metrics table.
pub struct ServerContext {
    pub db: Arc<Db>,
    sinks: RwLock<Vec<Arc<dyn PostCommitSink>>>,
    read_only: AtomicBool,
    metrics: HashMap<&'static str, Metrics>,
}

impl ServerContext {
    pub fn new(db: Arc<Db>) -> Self {
        let metrics = COMMANDS.iter().map(|c| (c.name, Metrics::default())).collect();
        Self {
            db,
            sinks: RwLock::new(Vec::new()),
            read_only: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn register_sink(&self, sink: Arc<dyn PostCommitSink>) {
        self.sinks.write().push(sink);
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn metrics(&self, verb: &str) -> Option<&Metrics> {
        self.metrics.get(verb)
    }

    fn notify_commit(&self, verb: &str, args: &[Bytes]) {
        for sink in self.sinks.read().iter() {
            sink.on_commit(verb, args);
        }
    }
}

/// Runs the full request pipeline for one already-parsed command line.
/// `verb` and `args` come straight off the wire; `args` is consumed by the
/// handler, so a copy is kept beforehand for anything that needs the
/// original command shape (AOF append, replica fan-out).
pub fn dispatch(ctx: &ServerContext, verb: &[u8], mut args: VecDeque<Bytes>) -> Result<Value, Error> {
    let name = String::from_utf8_lossy(verb).to_uppercase();
    let command = lookup(&name).ok_or_else(|| Error::UnknownCommand(name.to_lowercase()))?;

    if command.is_mutator && ctx.is_read_only() {
        return Err(Error::ReadOnlyReplica);
    }
    command.check_arity(args.len())?;

    let original_args: Vec<Bytes> = if command.is_mutator { args.iter().cloned().collect() } else { Vec::new() };
    let result = (command.handler)(&ctx.db, &mut args);
    if command.is_mutator {
        if let Ok(value) = &result {
            if let Some((verb, propagated)) = materialize_for_propagation(&ctx.db, command.name, original_args, value) {
                ctx.notify_commit(verb, &propagated);
            }
        }
    }
    result
}

/// Rewrites a mutator's captured arguments into the concrete form that must
/// reach AOF/replication, so a replica or AOF replay reaches the exact same
/// state as the primary. Returns `None` when the command had no effect and
/// nothing should be propagated.
///
/// Most commands are already concrete and pass through under their own verb.
/// A few resolve something internally that has to be pinned down before
/// propagation: `XADD`'s `*` id, `TSADD`'s omitted timestamp, and `SPOP`'s
/// random selection, which is rewritten into the equivalent deterministic
/// `SREM` (or `DEL`, if the pop emptied the set) the way Redis itself does.
fn materialize_for_propagation(db: &Db, verb: &'static str, mut args: Vec<Bytes>, result: &Value) -> Option<(&'static str, Vec<Bytes>)> {
    match verb {
        "XADD" => {
            if let Value::Blob(id) = result {
                if let Some(id_arg) = args.get_mut(1) {
                    *id_arg = Bytes::copy_from_slice(id);
                }
            }
            Some(("XADD", args))
        }
        "TSADD" => {
            if let Value::Integer(timestamp) = result {
                let concrete = Bytes::from(timestamp.to_string());
                match args.get_mut(2) {
                    Some(ts_arg) => *ts_arg = concrete,
                    None => args.push(concrete),
                }
            }
            Some(("TSADD", args))
        }
        "SPOP" => {
            let popped: Vec<Bytes> = match result {
                Value::Blob(member) => vec![Bytes::copy_from_slice(member)],
                Value::Array(members) => members
                    .iter()
                    .filter_map(|m| match m {
                        Value::Blob(b) => Some(Bytes::copy_from_slice(b)),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            if popped.is_empty() {
                return None;
            }
            let key = args.into_iter().next()?;
            if db.exists(&key) {
                let mut srem_args = vec![key];
                srem_args.extend(popped);
                Some(("SREM", srem_args))
            } else {
                Some(("DEL", vec![key]))
            }
        }
        _ => Some((verb, args)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::DEFAULT_VECTOR_DIM;

    fn ctx() -> ServerContext {
        ServerContext::new(Arc::new(Db::new(4, DEFAULT_VECTOR_DIM)))
    }

    fn args(words: &[&str]) -> VecDeque<Bytes> {
        words.iter().map(|w| Bytes::copy_from_slice(w.as_bytes())).collect()
    }

    #[test]
    fn registry_is_sorted_for_binary_search() {
        let mut names: Vec<&str> = COMMANDS.iter().map(|c| c.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, names.drain(..).collect::<Vec<_>>());
    }

    #[test]
    fn dispatches_a_known_command() {
        let ctx = ctx();
        let result = dispatch(&ctx, b"SET", args(&["foo", "bar"])).unwrap();
        assert_eq!(Value::Ok, result);
        assert_eq!(Value::Blob("bar".into()), dispatch(&ctx, b"get", args(&["foo"])).unwrap());
    }

    #[test]
    fn rejects_unknown_verb() {
        let ctx = ctx();
        assert_eq!(Err(Error::UnknownCommand("frobnicate".into())), dispatch(&ctx, b"FROBNICATE", args(&[])));
    }

    #[test]
    fn rejects_wrong_arity() {
        let ctx = ctx();
        assert!(dispatch(&ctx, b"GET", args(&[])).is_err());
    }

    #[test]
    fn rejects_mutators_on_a_read_only_replica() {
        let ctx = ctx();
        ctx.set_read_only(true);
        assert_eq!(Err(Error::ReadOnlyReplica), dispatch(&ctx, b"SET", args(&["foo", "bar"])));
        assert!(dispatch(&ctx, b"GET", args(&["foo"])).is_ok());
    }

    struct CountingSink(std::sync::atomic::AtomicUsize);
    impl PostCommitSink for CountingSink {
        fn on_commit(&self, _verb: &str, _args: &[Bytes]) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn notifies_sinks_only_on_successful_mutators() {
        let ctx = ctx();
        let sink = Arc::new(CountingSink(std::sync::atomic::AtomicUsize::new(0)));
        ctx.register_sink(sink.clone());
        dispatch(&ctx, b"SET", args(&["foo", "bar"])).unwrap();
        dispatch(&ctx, b"GET", args(&["foo"])).unwrap();
        let _ = dispatch(&ctx, b"GET", args(&[]));
        assert_eq!(1, sink.0.load(Ordering::SeqCst));
    }

    struct CapturingSink(parking_lot::Mutex<Vec<Bytes>>);
    impl PostCommitSink for CapturingSink {
        fn on_commit(&self, _verb: &str, args: &[Bytes]) {
            *self.0.lock() = args.to_vec();
        }
    }

    #[test]
    fn propagates_xadd_with_the_resolved_id_instead_of_the_wildcard() {
        let ctx = ctx();
        let sink = Arc::new(CapturingSink(parking_lot::Mutex::new(Vec::new())));
        ctx.register_sink(sink.clone());
        let result = dispatch(&ctx, b"XADD", args(&["stream", "*", "field", "value"])).unwrap();
        let id = match result {
            Value::Blob(id) => Bytes::copy_from_slice(&id),
            other => panic!("expected a blob id, got {:?}", other),
        };
        assert_eq!(id, sink.0.lock()[1]);
        assert_ne!(Bytes::from_static(b"*"), sink.0.lock()[1]);
    }

    #[test]
    fn propagates_tsadd_with_the_resolved_timestamp_when_omitted() {
        let ctx = ctx();
        let sink = Arc::new(CapturingSink(parking_lot::Mutex::new(Vec::new())));
        ctx.register_sink(sink.clone());
        let result = dispatch(&ctx, b"TSADD", args(&["series", "1.0"])).unwrap();
        let timestamp = match result {
            Value::Integer(t) => t,
            other => panic!("expected an integer timestamp, got {:?}", other),
        };
        let captured = sink.0.lock();
        assert_eq!(3, captured.len());
        assert_eq!(timestamp.to_string().as_bytes(), captured[2].as_ref());
    }

    struct CapturingVerbSink(parking_lot::Mutex<(String, Vec<Bytes>)>);
    impl PostCommitSink for CapturingVerbSink {
        fn on_commit(&self, verb: &str, args: &[Bytes]) {
            *self.0.lock() = (verb.to_owned(), args.to_vec());
        }
    }

    #[test]
    fn propagates_spop_as_srem_with_the_popped_member() {
        let ctx = ctx();
        dispatch(&ctx, b"SADD", args(&["s", "a", "b", "c"])).unwrap();
        let sink = Arc::new(CapturingVerbSink(parking_lot::Mutex::new((String::new(), Vec::new()))));
        ctx.register_sink(sink.clone());
        let result = dispatch(&ctx, b"SPOP", args(&["s"])).unwrap();
        let popped = match result {
            Value::Blob(member) => Bytes::copy_from_slice(&member),
            other => panic!("expected a blob member, got {:?}", other),
        };
        let (verb, captured) = sink.0.lock().clone();
        assert_eq!("SREM", verb);
        assert_eq!(vec![Bytes::from("s"), popped], captured);
    }

    #[test]
    fn propagates_spop_as_del_when_it_empties_the_set() {
        let ctx = ctx();
        dispatch(&ctx, b"SADD", args(&["s", "only"])).unwrap();
        let sink = Arc::new(CapturingVerbSink(parking_lot::Mutex::new((String::new(), Vec::new()))));
        ctx.register_sink(sink.clone());
        dispatch(&ctx, b"SPOP", args(&["s"])).unwrap();
        let (verb, captured) = sink.0.lock().clone();
        assert_eq!("DEL", verb);
        assert_eq!(vec![Bytes::from("s")], captured);
    }

    #[test]
    fn spop_on_a_missing_key_propagates_nothing() {
        let ctx = ctx();
        let sink = Arc::new(CapturingVerbSink(parking_lot::Mutex::new((String::new(), Vec::new()))));
        ctx.register_sink(sink.clone());
        assert_eq!(Value::Null, dispatch(&ctx, b"SPOP", args(&["missing"])).unwrap());
        assert_eq!((String::new(), Vec::new()), *sink.0.lock());
    }
}
