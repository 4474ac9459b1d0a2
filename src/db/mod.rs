//! The keyspace: a striped-lock table of slots, each holding one typed value
//! plus its expiration metadata.
pub mod expiration;

use crate::{error::Error, time::now_millis, value::Value};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

pub const DEFAULT_STRIPES: usize = 1024;
pub const DEFAULT_VECTOR_DIM: usize = 128;

/// One keyspace entry: its value, optional absolute expiration (millis
/// since epoch), and a mutation counter.
#[derive(Debug, Clone)]
pub struct Slot {
    pub value: Value,
    pub expire_at: Option<i64>,
    pub version: u64,
}

impl Slot {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expire_at: None,
            version: 0,
        }
    }

    pub fn is_live(&self) -> bool {
        match self.expire_at {
            Some(at) => at > now_millis(),
            None => true,
        }
    }

    pub fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

type Stripe = Mutex<HashMap<Bytes, Slot>>;

pub struct Db {
    stripes: Vec<Stripe>,
    vector_dim: usize,
}

impl Db {
    pub fn new(stripes: usize, vector_dim: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(HashMap::new())).collect(),
            vector_dim,
        }
    }

    pub fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_for(&self, key: &[u8]) -> usize {
        (seahash::hash(key) as usize) % self.stripes.len()
    }

    /// Runs `f` with exclusive access to the stripe backing `key`. Expired
    /// slots are removed lazily before `f` sees the map.
    pub fn with_stripe<F, R>(&self, key: &[u8], f: F) -> R
    where
        F: FnOnce(&mut HashMap<Bytes, Slot>) -> R,
    {
        let idx = self.stripe_for(key);
        let mut guard = self.stripes[idx].lock();
        self.expire_in_place(&mut guard, key);
        f(&mut guard)
    }

    fn expire_in_place(&self, map: &mut HashMap<Bytes, Slot>, key: &[u8]) {
        let expired = map.get(key).map(|s| !s.is_live()).unwrap_or(false);
        if expired {
            map.remove(key);
        }
    }

    /// Locks every stripe backing `keys`, in ascending stripe-index order
    /// (deduplicated), to prevent cross-command deadlock.
    pub fn with_stripes<F, R>(&self, keys: &[&[u8]], f: F) -> R
    where
        F: FnOnce(&Db, &mut [MutexGuard<'_, HashMap<Bytes, Slot>>]) -> R,
    {
        let mut idxs: Vec<usize> = keys.iter().map(|k| self.stripe_for(k)).collect();
        idxs.sort_unstable();
        idxs.dedup();
        let mut guards: Vec<MutexGuard<'_, HashMap<Bytes, Slot>>> =
            idxs.iter().map(|&i| self.stripes[i].lock()).collect();
        for key in keys {
            let idx = self.stripe_for(key);
            let pos = idxs.binary_search(&idx).unwrap();
            self.expire_in_place(&mut guards[pos], key);
        }
        f(self, &mut guards)
    }

    /// Finds the guard (from a `with_stripes` call) backing `key`.
    pub fn stripe_of<'a, 'b>(
        &self,
        guards: &'b mut [MutexGuard<'a, HashMap<Bytes, Slot>>],
        stripe_idxs_sorted: &[usize],
        key: &[u8],
    ) -> &'b mut HashMap<Bytes, Slot> {
        let idx = self.stripe_for(key);
        let pos = stripe_idxs_sorted.binary_search(&idx).unwrap();
        &mut guards[pos]
    }

    pub fn sorted_stripe_idxs(&self, keys: &[&[u8]]) -> Vec<usize> {
        let mut idxs: Vec<usize> = keys.iter().map(|k| self.stripe_for(k)).collect();
        idxs.sort_unstable();
        idxs.dedup();
        idxs
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.with_stripe(key, |map| map.contains_key(key))
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        self.with_stripe(key, |map| map.remove(key).is_some())
    }

    pub fn type_name(&self, key: &[u8]) -> Option<&'static str> {
        self.with_stripe(key, |map| map.get(key).map(|s| s.value.type_name()))
    }

    pub fn ttl_millis(&self, key: &[u8]) -> Option<Option<i64>> {
        self.with_stripe(key, |map| {
            map.get(key).map(|s| s.expire_at.map(|at| at - now_millis()))
        })
    }

    pub fn set_expire_at(&self, key: &[u8], at_millis: i64) -> bool {
        self.with_stripe(key, |map| match map.get_mut(key) {
            Some(slot) => {
                slot.expire_at = Some(at_millis);
                true
            }
            None => false,
        })
    }

    pub fn clear_expire(&self, key: &[u8]) -> bool {
        self.with_stripe(key, |map| match map.get_mut(key) {
            Some(slot) if slot.expire_at.is_some() => {
                slot.expire_at = None;
                true
            }
            _ => false,
        })
    }

    /// Glob-matches live keys. Linear scan; diagnostics/tests only.
    pub fn keys_matching(&self, pattern: &str) -> Vec<Bytes> {
        let pattern = glob::Pattern::new(pattern).unwrap_or_else(|_| glob::Pattern::new("*").unwrap());
        let mut out = Vec::new();
        for stripe in &self.stripes {
            let guard = stripe.lock();
            for (key, slot) in guard.iter() {
                if slot.is_live() {
                    if let Ok(s) = std::str::from_utf8(key) {
                        if pattern.matches(s) {
                            out.push(key.clone());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn dbsize(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().len()).sum()
    }

    /// A consistent point-in-time copy of every live slot, used by RDB save
    /// and AOF rewrite.
    pub fn snapshot(&self) -> Vec<(Bytes, Slot)> {
        let mut out = Vec::new();
        for stripe in &self.stripes {
            let guard = stripe.lock();
            for (key, slot) in guard.iter() {
                if slot.is_live() {
                    out.push((key.clone(), slot.clone()));
                }
            }
        }
        out
    }

    /// Samples up to `n` keys carrying an expiration, across randomly
    /// chosen stripes, deleting the expired ones. Returns `(sampled, expired)`.
    pub fn sweep_sample(&self, n: usize) -> (usize, usize) {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut sampled = 0;
        let mut expired = 0;
        let mut tried_stripes = 0;
        while sampled < n && tried_stripes < self.stripes.len() * 2 {
            tried_stripes += 1;
            let idx = rng.gen_range(0..self.stripes.len());
            let mut guard = self.stripes[idx].lock();
            let to_remove: Vec<Bytes> = guard
                .iter()
                .filter(|(_, slot)| slot.expire_at.is_some())
                .take(n - sampled)
                .map(|(k, _)| k.clone())
                .collect();
            for key in to_remove {
                sampled += 1;
                let is_live = guard.get(&key).map(|s| s.is_live()).unwrap_or(false);
                if !is_live {
                    guard.remove(&key);
                    expired += 1;
                }
            }
        }
        (sampled, expired)
    }

    /// Snapshot of every live `Vector` key, used by `VECSEARCH`'s brute-force scan.
    pub fn vectors_snapshot(&self) -> Vec<(Bytes, Vec<f32>)> {
        let mut out = Vec::new();
        for stripe in &self.stripes {
            let guard = stripe.lock();
            for (key, slot) in guard.iter() {
                if slot.is_live() {
                    if let Value::Vector(v) = &slot.value {
                        out.push((key.clone(), v.read().clone()));
                    }
                }
            }
        }
        out
    }

    /// Replaces the entire keyspace, used by RDB load and replica full resync.
    pub fn replace_all(&self, entries: Vec<(Bytes, Slot)>) {
        for stripe in &self.stripes {
            stripe.lock().clear();
        }
        for (key, slot) in entries {
            self.with_stripe(&key, |map| {
                map.insert(key.clone(), slot);
            });
        }
    }
}

/// Checks the key's current value against an expected type, used by every
/// type-specific operation before it touches its payload.
pub fn check_type<'a>(map: &'a HashMap<Bytes, Slot>, key: &[u8], matches: fn(&Value) -> bool) -> Result<Option<&'a Slot>, Error> {
    match map.get(key) {
        Some(slot) if matches(&slot.value) => Ok(Some(slot)),
        Some(_) => Err(Error::WrongType),
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn set_and_get_round_trip() {
        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripe(b"foo", |map| {
            map.insert(Bytes::from("foo"), Slot::new(Value::new(b"bar")));
        });
        assert!(db.exists(b"foo"));
        assert_eq!(Some("string"), db.type_name(b"foo"));
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripe(b"foo", |map| {
            let mut slot = Slot::new(Value::new(b"bar"));
            slot.expire_at = Some(now_millis() - 1000);
            map.insert(Bytes::from("foo"), slot);
        });
        assert!(!db.exists(b"foo"));
    }

    #[test]
    fn multi_key_lock_is_deadlock_free_regardless_of_order() {
        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripes(&[b"a", b"b", b"c"], |db, guards| {
            let idxs = db.sorted_stripe_idxs(&[b"a", b"b", b"c"]);
            db.stripe_of(guards, &idxs, b"a")
                .insert(Bytes::from("a"), Slot::new(Value::new(b"1")));
            db.stripe_of(guards, &idxs, b"b")
                .insert(Bytes::from("b"), Slot::new(Value::new(b"2")));
        });
        assert!(db.exists(b"a"));
        assert!(db.exists(b"b"));
        assert!(!db.exists(b"c"));
    }

    #[test]
    fn ttl_reports_remaining_millis() {
        let db = Db::new(4, DEFAULT_VECTOR_DIM);
        db.with_stripe(b"foo", |map| {
            map.insert(Bytes::from("foo"), Slot::new(Value::new(b"bar")));
        });
        assert_eq!(Some(None), db.ttl_millis(b"foo"));
        db.set_expire_at(b"foo", now_millis() + 10_000);
        let ttl = db.ttl_millis(b"foo").flatten().unwrap();
        assert!(ttl > 0 && ttl <= 10_000);
    }
}
