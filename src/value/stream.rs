//! Append-only stream of `(id, field map)` entries, keyed by a strictly
//! increasing `ms-seq` id.
use crate::error::Error;
use bytes::Bytes;
use std::{cmp::Ordering, collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    /// Parses `ms-seq`, a bare `ms` (seq defaults to 0), or the `-`/`+` range markers.
    pub fn parse(s: &[u8]) -> Result<Self, Error> {
        let s = String::from_utf8_lossy(s);
        match s.as_ref() {
            "-" => return Ok(Self::MIN),
            "+" => return Ok(Self::MAX),
            _ => {}
        }
        let mut parts = s.splitn(2, '-');
        let ms = parts
            .next()
            .ok_or(Error::StreamIdNotMonotonic)?
            .parse::<u64>()
            .map_err(|_| Error::StreamIdNotMonotonic)?;
        let seq = match parts.next() {
            Some(seq) => seq.parse::<u64>().map_err(|_| Error::StreamIdNotMonotonic)?,
            None => 0,
        };
        Ok(StreamId { ms, seq })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    entries: BTreeMap<StreamId, Vec<(Bytes, Bytes)>>,
    last_id: Option<StreamId>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> Option<StreamId> {
        self.last_id
    }

    /// Appends a new entry. `id` must be strictly greater than the previous
    /// top id, or this returns `StreamIdNotMonotonic`.
    pub fn add(&mut self, id: StreamId, fields: Vec<(Bytes, Bytes)>) -> Result<StreamId, Error> {
        if let Some(last) = self.last_id {
            if id.cmp(&last) != Ordering::Greater {
                return Err(Error::StreamIdNotMonotonic);
            }
        }
        self.entries.insert(id, fields);
        self.last_id = Some(id);
        Ok(id)
    }

    /// Next auto-generated id for the given wall-clock millisecond.
    pub fn next_id(&self, ms: u64) -> StreamId {
        match self.last_id {
            Some(last) if last.ms == ms => StreamId {
                ms,
                seq: last.seq + 1,
            },
            Some(last) if last.ms > ms => StreamId {
                ms: last.ms,
                seq: last.seq + 1,
            },
            _ => StreamId { ms, seq: 0 },
        }
    }

    pub fn range(&self, start: StreamId, end: StreamId, count: Option<usize>) -> Vec<Entry> {
        let iter = self
            .entries
            .range(start..=end)
            .map(|(id, fields)| Entry {
                id: *id,
                fields: fields.clone(),
            });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn range_rev(&self, start: StreamId, end: StreamId, count: Option<usize>) -> Vec<Entry> {
        let iter = self
            .entries
            .range(end..=start)
            .rev()
            .map(|(id, fields)| Entry {
                id: *id,
                fields: fields.clone(),
            });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// Entries strictly greater than `after`, used by `XREAD`.
    pub fn after(&self, after: StreamId, count: Option<usize>) -> Vec<Entry> {
        let iter = self
            .entries
            .range((
                std::ops::Bound::Excluded(after),
                std::ops::Bound::Unbounded,
            ))
            .map(|(id, fields)| Entry {
                id: *id,
                fields: fields.clone(),
            });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_non_monotonic_id() {
        let mut s = Stream::new();
        s.add(StreamId { ms: 1, seq: 0 }, vec![]).unwrap();
        assert_eq!(
            Err(Error::StreamIdNotMonotonic),
            s.add(StreamId { ms: 1, seq: 0 }, vec![])
        );
    }

    #[test]
    fn auto_id_breaks_ties_within_same_ms() {
        let mut s = Stream::new();
        let id = s.next_id(5);
        s.add(id, vec![]).unwrap();
        let id2 = s.next_id(5);
        assert_eq!(StreamId { ms: 5, seq: 1 }, id2);
    }

    #[test]
    fn range_is_inclusive_and_ordered() {
        let mut s = Stream::new();
        s.add(StreamId { ms: 1, seq: 0 }, vec![]).unwrap();
        s.add(StreamId { ms: 2, seq: 0 }, vec![]).unwrap();
        s.add(StreamId { ms: 3, seq: 0 }, vec![]).unwrap();
        let entries = s.range(StreamId::MIN, StreamId::MAX, None);
        assert_eq!(3, entries.len());
        assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn parses_range_markers() {
        assert_eq!(StreamId::MIN, StreamId::parse(b"-").unwrap());
        assert_eq!(StreamId::MAX, StreamId::parse(b"+").unwrap());
        assert_eq!(StreamId { ms: 1, seq: 2 }, StreamId::parse(b"1-2").unwrap());
        assert_eq!(StreamId { ms: 1, seq: 0 }, StreamId::parse(b"1").unwrap());
    }
}
