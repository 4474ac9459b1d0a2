//! Fixed-dimension float vectors and brute-force similarity search.
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Cosine,
    Euclidean,
    Dot,
}

impl Metric {
    pub fn parse(s: &[u8]) -> Result<Self, Error> {
        match String::from_utf8_lossy(s).to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "dot" => Ok(Self::Dot),
            other => Err(Error::UnknownMetric(other.to_owned())),
        }
    }

    /// Higher is closer for every metric this returns.
    pub fn score(self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            Self::Cosine => {
                let dot = dot(a, b);
                let denom = norm(a) * norm(b);
                if denom == 0.0 {
                    0.0
                } else {
                    dot / denom
                }
            }
            Self::Euclidean => 1.0 / (1.0 + euclidean(a, b)),
            Self::Dot => dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum()
}

fn norm(a: &[f32]) -> f64 {
    dot(a, a).sqrt()
}

fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Validates a vector's length against the instance-wide dimension.
pub fn check_dim(v: &[f32], dim: usize) -> Result<(), Error> {
    if v.len() != dim {
        Err(Error::VectorDim(dim, v.len()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((Metric::Cosine.score(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn euclidean_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((Metric::Euclidean.score(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_product() {
        assert_eq!(32.0, Metric::Dot.score(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        assert_eq!(Err(Error::VectorDim(3, 2)), check_dim(&[1.0, 2.0], 3));
    }
}
