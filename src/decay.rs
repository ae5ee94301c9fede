use super::*;

/// Computes `1 - e^(-x)` with numerical stability.
fn exponential_saturation(x: f64) -> f64 {
    -(-x.min(36.0)).exp_m1()
}

pub(crate) fn calculate_time_bias(elapsed: Duration, window: Duration) -> f64 {
    assert!(!window.is_zero(), "window must be non-zero");
    exponential_saturation(elapsed.as_secs_f64() / window.as_secs_f64())
}

#[derive(Debug, Clone)]
pub(crate) struct DecayingAverage {
    value: f64,
    window: Duration,
    last_update: Instant,
}

impl DecayingAverage {
    pub(crate) fn new(window: Duration) -> Self {
        assert!(!window.is_zero(), "window must be non-zero");
        Self {
            value: 0.0,
            window,
            last_update: Instant::now(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_start_time(window: Duration, start: Instant) -> Self {
        assert!(!window.is_zero(), "window must be non-zero");
        Self {
            value: 0.0,
            window,
            last_update: start,
        }
    }

    pub(crate) fn record(&mut self, sample: f64, now: Instant) {
        let elapsed = now
            .saturating_duration_since(self.last_update)
            .as_secs_f64();

        if elapsed <= 0.0 {
            return;
        }

        let window_secs = self.window.as_secs_f64();
        let decay_factor = exponential_saturation(elapsed / window_secs);
        let normalizer = 1.0 + decay_factor;

        self.value = (self.value + (sample / elapsed) * decay_factor) / normalizer;
        self.last_update = now;
    }

    #[must_use]
    pub(crate) fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn value_at(&self, now: Instant) -> f64 {
        let mut clone = self.clone();
        clone.record(0.0, now);
        clone.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn exponential_saturation_at_zero() {
        assert_eq!(exponential_saturation(0.0), 0.0);
    }

    #[test]
    fn time_bias_approaches_one() {
        let bias = calculate_time_bias(secs(600), secs(60));
        assert!(bias > 0.99, "expected near 1.0, got {bias}");
    }

    #[test]
    fn starts_at_zero() {
        let avg = DecayingAverage::new(secs(300));
        assert_eq!(avg.value(), 0.0);
    }

    #[test]
    fn increases_with_samples() {
        let start = Instant::now();
        let mut avg = DecayingAverage::with_start_time(secs(60), start);

        avg.record(60.0, start + secs(1));

        assert!(avg.value() > 0.0);
        assert!(avg.value() < 60.0);
    }

    #[test]
    fn decays_over_time() {
        let start = Instant::now();
        let mut avg = DecayingAverage::with_start_time(secs(60), start);

        avg.record(100.0, start + secs(1));
        let initial = avg.value();

        avg.record(0.0, start + secs(31));
        assert!(avg.value() < initial);
    }

    #[test]
    fn value_at_decays_without_recording() {
        let start = Instant::now();
        let mut avg = DecayingAverage::with_start_time(secs(60), start);
        avg.record(100.0, start + secs(1));

        let peeked = avg.value_at(start + secs(61));
        assert!(peeked < avg.value());
    }

    #[test]
    #[should_panic(expected = "window must be non-zero")]
    fn zero_window_panics() {
        DecayingAverage::new(Duration::ZERO);
    }
}
