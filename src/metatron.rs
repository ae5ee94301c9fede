use super::*;

mod user;
mod worker;

pub(crate) use user::User;
pub(crate) use worker::Worker;

/// Default time-to-live for a stored subscription, matching the vardiff
/// retarget cadence: long enough to survive a brief reconnect, short enough
/// that a stale enonce1 can't be resurrected hours later.
const SESSION_TTL: Duration = Duration::from_secs(10 * 60);
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Pool-wide registry: extranonce allocation, session resumption, and the
/// accepted/rejected/hashrate stats surfaced over the HTTP API.
pub struct Metatron {
    extranonces: Extranonces,
    sessions: DashMap<Extranonce, SessionSnapshot>,
    users: DashMap<Address, Arc<User>>,
    blocks: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    connections: AtomicU64,
    started: Instant,
}

impl Metatron {
    pub fn new(extranonces: Extranonces) -> Self {
        Self {
            extranonces,
            sessions: DashMap::new(),
            users: DashMap::new(),
            blocks: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub(crate) fn extranonces(&self) -> &Extranonces {
        &self.extranonces
    }

    pub(crate) fn enonce1_size(&self) -> usize {
        self.extranonces.enonce1_size()
    }

    pub(crate) fn enonce2_size(&self) -> usize {
        self.extranonces.enonce2_size()
    }

    pub(crate) fn next_enonce1(&self) -> Extranonce {
        Extranonce::generate(self.enonce1_size())
    }

    /// Returns the stored session for `enonce1` if present and not expired,
    /// consuming it either way.
    pub(crate) fn take_session(&self, enonce1: &Extranonce) -> Option<SessionSnapshot> {
        let (_, snapshot) = self.sessions.remove(enonce1)?;
        if snapshot.is_expired(SESSION_TTL) {
            None
        } else {
            Some(snapshot)
        }
    }

    pub(crate) fn store_session(&self, snapshot: SessionSnapshot) {
        self.sessions.insert(snapshot.enonce1.clone(), snapshot);
    }

    pub(crate) fn get_or_create_worker(&self, address: Address, workername: &str) -> Arc<Worker> {
        let user = self
            .users
            .entry(address.clone())
            .or_insert_with(|| Arc::new(User::new(address)))
            .clone();

        user.get_or_create_worker(workername)
    }

    pub(crate) fn add_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sub_connection(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn total_connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub(crate) fn total_blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub(crate) fn total_users(&self) -> usize {
        self.users.len()
    }

    pub(crate) fn total_workers(&self) -> usize {
        self.users.iter().map(|u| u.worker_count()).sum()
    }

    pub(crate) fn hash_rate_5m(&self) -> HashRate {
        self.users
            .iter()
            .map(|u| u.hash_rate_5m())
            .fold(HashRate::ZERO, |acc, r| acc + r)
    }

    pub(crate) fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn accepted(&self) -> u64 {
        self.users.iter().map(|u| u.accepted()).sum()
    }

    pub(crate) fn rejected(&self) -> u64 {
        self.users.iter().map(|u| u.rejected()).sum()
    }

    pub(crate) fn best_ever(&self) -> Option<Difficulty> {
        self.users.iter().filter_map(|u| u.best_ever()).max()
    }

    pub(crate) fn last_share(&self) -> Option<Instant> {
        self.users.iter().filter_map(|u| u.last_share()).max()
    }

    pub(crate) fn get_user(&self, address: &Address) -> Option<Arc<User>> {
        self.users.get(address).map(|entry| entry.value().clone())
    }

    pub(crate) fn iter_users(&self) -> Vec<(Address, Arc<User>)> {
        self.users
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Live sessions stored for reconnect resumption, paired with remaining TTL.
    pub(crate) fn sessions(&self) -> Vec<(Extranonce, Duration)> {
        self.sessions
            .iter()
            .map(|entry| {
                let remaining = SESSION_TTL.saturating_sub(entry.value().age());
                (entry.key().clone(), remaining)
            })
            .collect()
    }

    /// Periodically drops stored sessions that were never reclaimed by a
    /// reconnecting miner.
    pub fn spawn(self: Arc<Self>, cancel_token: CancellationToken, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            let mut ticker = interval(SESSION_PURGE_INTERVAL);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sessions.retain(|_, snapshot| !snapshot.is_expired(SESSION_TTL));
                    }
                }
            }
        });
    }
}

impl StatusLine for Metatron {
    fn status_line(&self) -> String {
        format!(
            "hr_5m={}  users={}  workers={}  conns={}  blocks={}  uptime={}s",
            self.hash_rate_5m(),
            self.total_users(),
            self.total_workers(),
            self.total_connections(),
            self.total_blocks(),
            self.uptime().as_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metatron() -> Metatron {
        Metatron::new(Extranonces::Pool(PoolExtranonces::new(4, 8).unwrap()))
    }

    fn test_address() -> Address {
        "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"
            .parse::<Address<NetworkUnchecked>>()
            .unwrap()
            .assume_checked()
    }

    #[test]
    fn new_metatron_starts_at_zero() {
        let metatron = metatron();
        assert_eq!(metatron.total_connections(), 0);
        assert_eq!(metatron.total_blocks(), 0);
        assert_eq!(metatron.total_users(), 0);
        assert_eq!(metatron.total_workers(), 0);
    }

    #[test]
    fn connection_count_increments_and_decrements() {
        let metatron = metatron();

        metatron.add_connection();
        metatron.add_connection();
        assert_eq!(metatron.total_connections(), 2);

        metatron.sub_connection();
        assert_eq!(metatron.total_connections(), 1);
    }

    #[test]
    fn get_or_create_worker_creates_user_and_worker() {
        let metatron = metatron();
        let addr = test_address();

        metatron.get_or_create_worker(addr.clone(), "rig1");
        assert_eq!(metatron.total_users(), 1);
        assert_eq!(metatron.total_workers(), 1);

        metatron.get_or_create_worker(addr, "rig2");
        assert_eq!(metatron.total_users(), 1);
        assert_eq!(metatron.total_workers(), 2);
    }

    #[test]
    fn block_count_increments() {
        let metatron = metatron();
        metatron.add_block();
        assert_eq!(metatron.total_blocks(), 1);
    }

    #[test]
    fn next_enonce1_matches_configured_size() {
        let metatron = metatron();
        assert_eq!(metatron.next_enonce1().len(), 4);
    }

    #[test]
    fn store_and_take_session_roundtrips() {
        let metatron = metatron();
        let enonce1 = metatron.next_enonce1();

        metatron.store_session(SessionSnapshot::new(enonce1.clone()));

        let taken = metatron.take_session(&enonce1);
        assert!(taken.is_some());
        assert_eq!(taken.unwrap().enonce1, enonce1);

        assert!(metatron.take_session(&enonce1).is_none());
    }

    #[test]
    fn take_session_misses_unknown_enonce1() {
        let metatron = metatron();
        let enonce1 = metatron.next_enonce1();
        assert!(metatron.take_session(&enonce1).is_none());
    }
}
