use {super::*, parking_lot::Mutex};

struct Stats {
    dsps_1m: DecayingAverage,
    dsps_5m: DecayingAverage,
    dsps_1hr: DecayingAverage,
    dsps_1d: DecayingAverage,
    dsps_7d: DecayingAverage,
    best_ever: Option<Difficulty>,
    last_share: Option<Instant>,
    total_work: f64,
}

/// Per-(address, workername) accepted/rejected-share accounting.
pub(crate) struct Worker {
    workername: String,
    stats: Mutex<Stats>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl Worker {
    pub(crate) fn new(workername: String) -> Self {
        Self {
            workername,
            stats: Mutex::new(Stats {
                dsps_1m: DecayingAverage::new(Duration::from_secs(60)),
                dsps_5m: DecayingAverage::new(Duration::from_secs(5 * 60)),
                dsps_1hr: DecayingAverage::new(Duration::from_secs(60 * 60)),
                dsps_1d: DecayingAverage::new(Duration::from_secs(24 * 60 * 60)),
                dsps_7d: DecayingAverage::new(Duration::from_secs(7 * 24 * 60 * 60)),
                best_ever: None,
                last_share: None,
                total_work: 0.0,
            }),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub(crate) fn workername(&self) -> &str {
        &self.workername
    }

    pub(crate) fn record_accepted(&self, pool_diff: Difficulty, share_diff: Difficulty) {
        let now = Instant::now();
        let diff = pool_diff.as_f64();

        let mut stats = self.stats.lock();
        stats.dsps_1m.record(diff, now);
        stats.dsps_5m.record(diff, now);
        stats.dsps_1hr.record(diff, now);
        stats.dsps_1d.record(diff, now);
        stats.dsps_7d.record(diff, now);
        stats.total_work += diff;
        stats.last_share = Some(now);
        if stats.best_ever.is_none_or(|best| share_diff > best) {
            stats.best_ever = Some(share_diff);
        }
        drop(stats);

        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hash_rate_1m(&self) -> HashRate {
        HashRate::from_difficulty_rate(self.stats.lock().dsps_1m.value_at(Instant::now()), 1.0)
    }

    pub(crate) fn hash_rate_5m(&self) -> HashRate {
        HashRate::from_difficulty_rate(self.stats.lock().dsps_5m.value_at(Instant::now()), 1.0)
    }

    pub(crate) fn hash_rate_1h(&self) -> HashRate {
        HashRate::from_difficulty_rate(self.stats.lock().dsps_1hr.value_at(Instant::now()), 1.0)
    }

    pub(crate) fn hash_rate_1d(&self) -> HashRate {
        HashRate::from_difficulty_rate(self.stats.lock().dsps_1d.value_at(Instant::now()), 1.0)
    }

    pub(crate) fn hash_rate_7d(&self) -> HashRate {
        HashRate::from_difficulty_rate(self.stats.lock().dsps_7d.value_at(Instant::now()), 1.0)
    }

    pub(crate) fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub(crate) fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn best_ever(&self) -> Option<Difficulty> {
        self.stats.lock().best_ever
    }

    pub(crate) fn last_share(&self) -> Option<Instant> {
        self.stats.lock().last_share
    }

    pub(crate) fn total_work(&self) -> f64 {
        self.stats.lock().total_work
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_starts_at_zero() {
        let worker = Worker::new("rig1".into());
        assert_eq!(worker.workername(), "rig1");
        assert_eq!(worker.accepted(), 0);
        assert_eq!(worker.rejected(), 0);
        assert!(worker.best_ever().is_none());
        assert!(worker.last_share().is_none());
    }

    #[test]
    fn record_accepted_updates_counters_and_best_ever() {
        let worker = Worker::new("rig1".into());

        worker.record_accepted(Difficulty::from(100u64), Difficulty::from(100u64));
        worker.record_accepted(Difficulty::from(100u64), Difficulty::from(250u64));

        assert_eq!(worker.accepted(), 2);
        assert_eq!(worker.best_ever(), Some(Difficulty::from(250u64)));
        assert!(worker.last_share().is_some());
        assert!(worker.total_work() > 0.0);
    }

    #[test]
    fn record_rejected_increments_independently() {
        let worker = Worker::new("rig1".into());

        worker.record_rejected();
        worker.record_rejected();

        assert_eq!(worker.rejected(), 2);
        assert_eq!(worker.accepted(), 0);
    }
}
