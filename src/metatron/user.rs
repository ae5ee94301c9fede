use super::*;

/// All workers mining under a single payout address.
pub(crate) struct User {
    pub(crate) address: Address,
    workers: DashMap<String, Arc<Worker>>,
}

impl User {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            workers: DashMap::new(),
        }
    }

    pub(crate) fn get_or_create_worker(&self, workername: &str) -> Arc<Worker> {
        self.workers
            .entry(workername.to_string())
            .or_insert_with(|| Arc::new(Worker::new(workername.to_string())))
            .clone()
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn hash_rate_5m(&self) -> HashRate {
        self.workers
            .iter()
            .map(|w| w.hash_rate_5m())
            .fold(HashRate::ZERO, |acc, r| acc + r)
    }

    pub(crate) fn total_shares(&self) -> u64 {
        self.workers.iter().map(|w| w.accepted() + w.rejected()).sum()
    }

    pub(crate) fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn accepted(&self) -> u64 {
        self.workers.iter().map(|w| w.accepted()).sum()
    }

    pub(crate) fn rejected(&self) -> u64 {
        self.workers.iter().map(|w| w.rejected()).sum()
    }

    pub(crate) fn best_ever(&self) -> Option<Difficulty> {
        self.workers.iter().filter_map(|w| w.best_ever()).max()
    }

    pub(crate) fn last_share(&self) -> Option<Instant> {
        self.workers.iter().filter_map(|w| w.last_share()).max()
    }
}
