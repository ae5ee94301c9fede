use super::*;

#[derive(Debug, Clone)]
pub(crate) struct SessionSnapshot {
    pub(crate) enonce1: Extranonce,
    stored_at: Instant,
}

impl SessionSnapshot {
    pub(crate) fn new(enonce1: Extranonce) -> Self {
        Self {
            enonce1,
            stored_at: Instant::now(),
        }
    }

    pub(crate) fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }

    pub(crate) fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}
