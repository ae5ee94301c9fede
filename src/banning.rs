use super::*;

/// Process-wide, percentage-based IP ban list. Distinct from
/// [`stratifier::Bouncer`](crate::stratifier), which only tracks a single
/// connection's consecutive reject streak; this tracks the ratio of
/// invalid-to-total shares across a session's lifetime and is consulted by
/// every new connection on every listening port.
pub struct BanningManager {
    banned: DashMap<IpAddr, Instant>,
    ban_time: Duration,
    purge_interval: Duration,
    check_threshold: u64,
    invalid_percent: f64,
}

impl BanningManager {
    pub fn new(
        ban_time: Duration,
        purge_interval: Duration,
        check_threshold: u64,
        invalid_percent: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            banned: DashMap::new(),
            ban_time,
            purge_interval,
            check_threshold,
            invalid_percent,
        })
    }

    /// Spawns the background purge task. Returns the task handle so the
    /// caller can abort it on shutdown.
    pub fn spawn_purge_task(self: &Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        task::spawn(async move {
            let mut ticker = tokio::time::interval(manager.purge_interval);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => manager.purge_expired(),
                }
            }
        })
    }

    fn purge_expired(&self) {
        self.banned.retain(|_, banned_at| banned_at.elapsed() <= self.ban_time);
    }

    /// Returns whether the IP is currently banned, lazily evicting a stale
    /// entry if its ban has expired.
    pub fn check_ban(&self, ip: IpAddr) -> bool {
        let Some(entry) = self.banned.get(&ip) else {
            return false;
        };

        if entry.elapsed() > self.ban_time {
            drop(entry);
            self.banned.remove(&ip);
            false
        } else {
            true
        }
    }

    pub fn add_banned_ip(&self, ip: IpAddr) {
        warn!(%ip, "banning ip");
        self.banned.insert(ip, Instant::now());
    }

    pub fn check_threshold(&self) -> u64 {
        self.check_threshold
    }

    pub fn invalid_percent(&self) -> f64 {
        self.invalid_percent
    }
}

/// Per-session invalid/valid share counters, reset each time they cross
/// `check_threshold`. Sessions own one of these and call [`Self::evaluate`]
/// after each share; ejection/banning is the caller's responsibility.
#[derive(Debug, Default, Clone, Copy)]
pub struct BanCounters {
    valid: u64,
    invalid: u64,
}

impl BanCounters {
    pub fn record(&mut self, valid: bool) {
        if valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }
    }

    /// Once `valid + invalid` crosses `check_threshold`, returns whether the
    /// invalid fraction exceeds `invalid_percent`, resetting the counters
    /// either way.
    pub fn evaluate(&mut self, check_threshold: u64, invalid_percent: f64) -> Option<bool> {
        let total = self.valid + self.invalid;
        if total < check_threshold {
            return None;
        }

        let should_ban = (self.invalid as f64 / total as f64) * 100.0 >= invalid_percent;
        *self = Self::default();
        Some(should_ban)
    }
}
