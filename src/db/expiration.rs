//! Background active-expiration sweeper: a periodic tick that samples keys
//! with a TTL set and removes the ones that have passed, mirroring Redis's
//! probabilistic approach to bound tail latency.
use super::Db;
use log::debug;
use std::{sync::Arc, time::Duration};

const SAMPLE_SIZE: usize = 20;
const REPEAT_THRESHOLD: f64 = 0.25;

/// Runs until the process exits. Intended to be spawned as its own `tokio` task.
pub async fn run(db: Arc<Db>, tick: Duration) {
    let mut ticker = tokio::time::interval(tick);
    loop {
        ticker.tick().await;
        loop {
            let (sampled, expired) = db.sweep_sample(SAMPLE_SIZE);
            if sampled == 0 {
                break;
            }
            debug!("expiration sweep: sampled {} expired {}", sampled, expired);
            if (expired as f64) / (sampled as f64) <= REPEAT_THRESHOLD {
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{db::Slot, time::now_millis, value::Value};
    use bytes::Bytes;

    #[test]
    fn sweep_removes_expired_keys_only() {
        let db = Db::new(4, super::DEFAULT_VECTOR_DIM);
        db.with_stripe(b"expired", |map| {
            let mut slot = Slot::new(Value::new(b"x"));
            slot.expire_at = Some(now_millis() - 1000);
            map.insert(Bytes::from("expired"), slot);
        });
        db.with_stripe(b"alive", |map| {
            let mut slot = Slot::new(Value::new(b"y"));
            slot.expire_at = Some(now_millis() + 1_000_000);
            map.insert(Bytes::from("alive"), slot);
        });
        let (sampled, expired) = db.sweep_sample(20);
        assert_eq!(2, sampled);
        assert_eq!(1, expired);
        assert!(db.exists(b"alive"));
    }
}
