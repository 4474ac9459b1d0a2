//! Append-only, non-decreasing-timestamp samples with bucketed aggregation.
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl Aggregate {
    pub fn parse(s: &[u8]) -> Result<Self, Error> {
        match String::from_utf8_lossy(s).to_lowercase().as_str() {
            "avg" => Ok(Self::Avg),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(Error::UnknownAggregate(other.to_owned())),
        }
    }

    fn apply(self, samples: &[Sample]) -> f64 {
        match self {
            Self::Avg => samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64,
            Self::Sum => samples.iter().map(|s| s.value).sum(),
            Self::Min => samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min),
            Self::Max => samples
                .iter()
                .map(|s| s.value)
                .fold(f64::NEG_INFINITY, f64::max),
            Self::Count => samples.len() as f64,
            Self::First => samples.first().map(|s| s.value).unwrap_or(0.0),
            Self::Last => samples.last().map(|s| s.value).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    /// Appends `sample`; rejected if older than the last recorded timestamp.
    pub fn add(&mut self, sample: Sample) -> Result<(), Error> {
        if let Some(last) = self.samples.last() {
            if sample.timestamp < last.timestamp {
                return Err(Error::OutOfOrderTimestamp);
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn range(&self, start: i64, end: i64, count: Option<usize>) -> Vec<Sample> {
        let iter = self
            .samples
            .iter()
            .copied()
            .filter(|s| s.timestamp >= start && s.timestamp <= end);
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// Buckets samples in `[start, end]` by `(t - start) / bucket` and
    /// applies `op` to each bucket, in ascending bucket order.
    pub fn aggregate(&self, op: Aggregate, start: i64, end: i64, bucket: i64) -> Vec<(i64, f64)> {
        if bucket <= 0 {
            return Vec::new();
        }
        let mut buckets: Vec<(i64, Vec<Sample>)> = Vec::new();
        for sample in self.range(start, end, None) {
            let idx = (sample.timestamp - start) / bucket;
            match buckets.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, v)) => v.push(sample),
                None => buckets.push((idx, vec![sample])),
            }
        }
        buckets.sort_by_key(|(i, _)| *i);
        buckets
            .into_iter()
            .map(|(i, v)| (start + i * bucket, op.apply(&v)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_out_of_order_samples() {
        let mut ts = TimeSeries::new();
        ts.add(Sample {
            timestamp: 10,
            value: 1.0,
        })
        .unwrap();
        let err = ts.add(Sample {
            timestamp: 5,
            value: 2.0,
        });
        assert_eq!(Err(Error::OutOfOrderTimestamp), err);
        assert_eq!(1, ts.len());
    }

    #[test]
    fn aggregate_buckets_by_window() {
        let mut ts = TimeSeries::new();
        for (t, v) in [(0, 1.0), (1, 2.0), (10, 3.0), (11, 4.0)] {
            ts.add(Sample {
                timestamp: t,
                value: v,
            })
            .unwrap();
        }
        let result = ts.aggregate(Aggregate::Sum, 0, 11, 10);
        assert_eq!(vec![(0, 3.0), (10, 7.0)], result);
    }
}
