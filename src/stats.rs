//! Jitter derived from recent probe history.

use std::sync::Arc;

use crate::db::{DbError, Store};

/// Number of recent `up` samples jitter is computed over.
pub const JITTER_WINDOW: usize = 10;

/// Computes per-host statistics from the probe history.
///
/// Every call reads the store afresh; nothing is cached.
#[derive(Clone)]
pub struct StatsEngine {
    store: Arc<Store>,
}

impl StatsEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Sample standard deviation of the last [`JITTER_WINDOW`] up latencies, 2 decimals.
    pub fn jitter(&self, host: &str) -> Result<f64, DbError> {
        let latencies = self.store.recent_up_latencies(host, JITTER_WINDOW)?;
        Ok(jitter_of(&latencies))
    }
}

/// Jitter of a latency window: 0 with fewer than two samples.
pub fn jitter_of(latencies: &[f64]) -> f64 {
    match sample_std_dev(latencies) {
        Some(sd) => round2(sd),
        None => 0.0,
    }
}

/// Bessel-corrected standard deviation, `None` for fewer than two samples.
fn sample_std_dev(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);

    Some(variance.sqrt())
}

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeRecord;

    #[test]
    fn test_jitter_needs_two_samples() {
        assert_eq!(jitter_of(&[]), 0.0);
        assert_eq!(jitter_of(&[42.0]), 0.0);
    }

    #[test]
    fn test_jitter_sample_std_dev() {
        assert_eq!(jitter_of(&[10.0, 20.0]), 7.07);
        assert_eq!(jitter_of(&[5.0, 5.0, 5.0]), 0.0);
        // mean 5, squared deviations sum 32, 32/7 -> sqrt = 2.138
        assert_eq!(jitter_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.14);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.235001), 1.24);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_engine_uses_last_ten_up_samples() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = StatsEngine::new(store.clone());

        assert_eq!(engine.jitter("h").unwrap(), 0.0);

        store.insert_record(&ProbeRecord::up("h", 1.0, 10.0)).unwrap();
        assert_eq!(engine.jitter("h").unwrap(), 0.0);

        store.insert_record(&ProbeRecord::down("h", 2.0)).unwrap();
        store.insert_record(&ProbeRecord::up("h", 3.0, 20.0)).unwrap();
        store.insert_record(&ProbeRecord::up("other", 4.0, 500.0)).unwrap();
        assert_eq!(engine.jitter("h").unwrap(), 7.07);

        // Ten identical samples push the old ones out of the window.
        for i in 0..10 {
            store.insert_record(&ProbeRecord::up("h", 10.0 + i as f64, 15.0)).unwrap();
        }
        assert_eq!(engine.jitter("h").unwrap(), 0.0);
    }
}
