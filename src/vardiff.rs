use super::*;

/// Fixed-capacity ring buffer of inter-share intervals (whole seconds),
/// used to compute the moving average that drives retarget decisions.
#[derive(Debug, Clone)]
struct RingBuffer {
    is_full: bool,
    max_size: usize,
    cursor: usize,
    data: Vec<i64>,
}

impl RingBuffer {
    fn new(max_size: usize) -> Self {
        Self {
            is_full: false,
            max_size: max_size.max(1),
            cursor: 0,
            data: Vec::new(),
        }
    }

    fn append(&mut self, x: i64) {
        if self.is_full {
            self.data[self.cursor] = x;
            self.cursor = (self.cursor + 1) % self.max_size;
        } else {
            self.data.push(x);
            self.cursor += 1;
            if self.data.len() == self.max_size {
                self.cursor = 0;
                self.is_full = true;
            }
        }
    }

    fn avg(&self) -> f64 {
        let sum: i64 = self.data.iter().sum();
        sum as f64 / self.size() as f64
    }

    fn size(&self) -> usize {
        if self.is_full { self.max_size } else { self.cursor }
    }

    fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
        self.is_full = false;
    }
}

/// Ckpool-style per-session variable difficulty controller. Tracks the
/// interval between accepted shares in a ring buffer, retargeting once per
/// `retarget_time` towards a `target_time` average, with retargets gated by
/// a variance band so well-behaved miners aren't jittered every share.
#[derive(Debug)]
pub(crate) struct Vardiff {
    target_time: i64,
    retarget_time: i64,
    max_target_time: f64,
    min_target_time: f64,
    min_diff: Difficulty,
    max_diff: Option<Difficulty>,
    x2_mode: bool,
    current_diff: Difficulty,
    time_buffer: RingBuffer,
    last_rtc: i64,
    last_timestamp: i64,
}

const VARDIFF_VARIANCE_PERCENT: f64 = 0.3;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

impl Vardiff {
    pub(crate) fn new(
        start_diff: Difficulty,
        period: Duration,
        window: Duration,
        min_diff: Option<Difficulty>,
        max_diff: Option<Difficulty>,
    ) -> Self {
        let target_time = period.as_secs_f64().round().max(1.0) as i64;
        let retarget_time = window.as_secs_f64().round().max(1.0) as i64;
        Self::with_timestamp(
            start_diff,
            target_time,
            retarget_time,
            min_diff,
            max_diff,
            unix_now(),
        )
    }

    fn with_timestamp(
        start_diff: Difficulty,
        target_time: i64,
        retarget_time: i64,
        min_diff: Option<Difficulty>,
        max_diff: Option<Difficulty>,
        timestamp: i64,
    ) -> Self {
        let buffer_size = (retarget_time / target_time * 4).max(1) as usize;
        Self {
            target_time,
            retarget_time,
            max_target_time: target_time as f64 * (1.0 + VARDIFF_VARIANCE_PERCENT),
            min_target_time: target_time as f64 * (1.0 - VARDIFF_VARIANCE_PERCENT),
            min_diff: min_diff.unwrap_or(Difficulty::from(1)),
            max_diff,
            x2_mode: false,
            current_diff: start_diff,
            time_buffer: RingBuffer::new(buffer_size),
            last_rtc: timestamp - retarget_time / 2,
            last_timestamp: timestamp,
        }
    }

    pub(crate) fn current_diff(&self) -> Difficulty {
        self.current_diff
    }

    /// Records an accepted share's arrival time against `current_diff` and,
    /// if a retarget is due, returns the new difficulty (clamped to
    /// `[min_diff, min(max_diff, network_diff)]`).
    pub(crate) fn record_share(
        &mut self,
        current_diff: Difficulty,
        network_diff: Difficulty,
    ) -> Option<Difficulty> {
        let timestamp = unix_now();

        let since_last = timestamp - self.last_timestamp;
        self.time_buffer.append(since_last);
        self.last_timestamp = timestamp;

        if timestamp - self.last_rtc < self.retarget_time && self.time_buffer.size() > 0 {
            return None;
        }

        self.last_rtc = timestamp;

        let avg = self.time_buffer.avg();
        let current = current_diff.as_f64();
        let mut ddiff = self.target_time as f64 / avg;

        let max_diff = self
            .max_diff
            .map_or(network_diff.as_f64(), |d| d.as_f64().min(network_diff.as_f64()));

        let new_diff = if avg > self.max_target_time && current > self.min_diff.as_f64() {
            if self.x2_mode {
                ddiff = 0.5;
            }
            if ddiff * current < self.min_diff.as_f64() {
                ddiff = self.min_diff.as_f64() / current;
            }
            current * ddiff
        } else if avg < self.min_target_time {
            if self.x2_mode {
                ddiff = 2.0;
            }
            if ddiff * current > max_diff {
                ddiff = max_diff / current;
            }
            current * ddiff
        } else {
            return None;
        };

        self.time_buffer.clear();

        let new_diff = if new_diff <= 0.0 { current } else { new_diff };
        let new_diff = Difficulty::from(new_diff.clamp(self.min_diff.as_f64(), max_diff));

        if new_diff == current_diff {
            return None;
        }

        debug!(old = %current_diff, new = %new_diff, avg_secs = avg, "vardiff retarget");

        self.current_diff = new_diff;
        Some(new_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vardiff(start_diff: Difficulty, target_time: i64, retarget_time: i64, ts: i64) -> Vardiff {
        Vardiff::with_timestamp(start_diff, target_time, retarget_time, None, None, ts)
    }

    #[test]
    fn ring_buffer_wraps_once_full() {
        let mut rb = RingBuffer::new(3);
        rb.append(1);
        rb.append(2);
        rb.append(3);
        assert!(rb.is_full);
        assert_eq!(rb.avg(), 2.0);

        rb.append(9);
        assert_eq!(rb.data, vec![9, 2, 3]);
    }

    #[test]
    fn clear_resets_state() {
        let mut rb = RingBuffer::new(2);
        rb.append(1);
        rb.append(2);
        rb.clear();
        assert!(!rb.is_full);
        assert_eq!(rb.size(), 0);
    }

    #[test]
    fn first_call_after_construction_can_retarget_immediately() {
        // last_rtc is seeded at `timestamp - retarget_time / 2`, matching the
        // original implementation's bootstrap, so the very first share can
        // already be outside the gate once retarget_time/2 has elapsed.
        let mut vd = vardiff(Difficulty::from(10), 10, 20, 1_000);
        assert_eq!(vd.last_rtc, 990);
        let _ = vd.record_share(Difficulty::from(10), Difficulty::from(1_000_000));
    }

    #[test]
    fn fast_shares_inflate_difficulty() {
        let mut vd = vardiff(Difficulty::from(10), 10, 20, 1_000);

        // fabricate an already-full, fast-running buffer and force a retarget
        for _ in 0..4 {
            vd.time_buffer.append(1);
        }
        vd.last_rtc = 0;

        let new_diff = vd
            .record_share(Difficulty::from(10), Difficulty::from(1_000_000))
            .expect("should retarget upward");
        assert!(new_diff > Difficulty::from(10));
    }

    #[test]
    fn slow_shares_deflate_but_respect_min_diff() {
        let mut vd = Vardiff::with_timestamp(
            Difficulty::from(2),
            10,
            20,
            Some(Difficulty::from(1)),
            None,
            1_000,
        );

        for _ in 0..4 {
            vd.time_buffer.append(60);
        }
        vd.last_rtc = 0;

        let new_diff = vd
            .record_share(Difficulty::from(2), Difficulty::from(1_000_000))
            .expect("should retarget downward");
        assert!(new_diff <= Difficulty::from(2));
        assert!(new_diff >= Difficulty::from(1));
    }

    #[test]
    fn never_exceeds_network_diff() {
        let mut vd = vardiff(Difficulty::from(900_000), 10, 20, 1_000);

        for _ in 0..4 {
            vd.time_buffer.append(1);
        }
        vd.last_rtc = 0;

        let network_diff = Difficulty::from(950_000);
        if let Some(new_diff) = vd.record_share(Difficulty::from(900_000), network_diff) {
            assert!(new_diff <= network_diff);
        }
    }

    #[test]
    fn current_diff_updates_only_on_retarget() {
        let mut vd = vardiff(Difficulty::from(10), 10, 20, 1_000);
        assert_eq!(vd.current_diff(), Difficulty::from(10));

        for _ in 0..4 {
            vd.time_buffer.append(1);
        }
        vd.last_rtc = 0;

        let new_diff = vd
            .record_share(Difficulty::from(10), Difficulty::from(1_000_000))
            .expect("should retarget upward");
        assert_eq!(vd.current_diff(), new_diff);
    }
}
