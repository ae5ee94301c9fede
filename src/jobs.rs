use super::*;

#[derive(Debug)]
pub(crate) struct Jobs {
    latest: Option<Arc<Job>>,
    seen: LruCache<BlockHash, ()>,
    valid: HashMap<JobId, Arc<Job>>,
    submissions: HashMap<JobId, HashSet<(Extranonce, Ntime, Nonce)>>,
}

impl Jobs {
    pub(crate) fn new() -> Self {
        Self {
            valid: HashMap::new(),
            latest: None,
            seen: LruCache::new(NonZeroUsize::new(LRU_CACHE_SIZE).expect("should be non-zero")),
            submissions: HashMap::new(),
        }
    }

    pub(crate) fn next_id(&mut self) -> JobId {
        JobId::random()
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.valid.get(id).cloned()
    }

    pub(crate) fn insert(&mut self, job: Arc<Job>) -> bool {
        let prev = self.latest.as_ref().map(|j| j.workbase.as_ref());
        let clean = job.workbase.clean_jobs(prev);

        self.latest = Some(job.clone());

        if clean {
            self.seen.clear();
            self.valid.clear();
            self.submissions.clear();
        }

        self.valid.insert(job.job_id, job);
        clean
    }

    pub(crate) fn is_duplicate(&mut self, block_hash: BlockHash) -> bool {
        self.seen.put(block_hash, ()).is_some()
    }

    /// Checks whether this exact `(extranonce2, ntime, nonce)` has already
    /// been submitted against this job, recording it either way. Run this
    /// before hashing the header: it's the cheap, pre-PoW guard against a
    /// miner replaying the same share, independent of `is_duplicate`'s
    /// post-hash check against already-found blocks.
    pub(crate) fn is_duplicate_submission(
        &mut self,
        job_id: JobId,
        extranonce2: Extranonce,
        ntime: Ntime,
        nonce: Nonce,
    ) -> bool {
        !self
            .submissions
            .entry(job_id)
            .or_default()
            .insert((extranonce2, ntime, nonce))
    }
}
