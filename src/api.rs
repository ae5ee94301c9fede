use {super::*, http_server::error::{OptionExt, ServerResult}};

/// Read-only status surface over [`Metatron`]: pool totals, per-user and
/// per-worker stats, and live (unclaimed) resumable sessions.
pub(crate) fn router(metatron: Arc<Metatron>) -> Router {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/users", get(users))
        .route("/api/users/{address}", get(user))
        .route("/api/sessions", get(sessions))
        .with_state(metatron)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub hash_rate_5m: HashRate,
    pub users: usize,
    pub workers: usize,
    pub connections: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub blocks: u64,
    pub best_ever: f64,
    pub last_share_secs: Option<u64>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub address: String,
    pub hash_rate_5m: HashRate,
    pub workers: usize,
    pub accepted: u64,
    pub rejected: u64,
    pub best_ever: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    pub address: String,
    pub hash_rate_5m: HashRate,
    pub accepted: u64,
    pub rejected: u64,
    pub best_ever: f64,
    pub workers: Vec<WorkerSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub name: String,
    pub hash_rate_1m: HashRate,
    pub accepted: u64,
    pub rejected: u64,
    pub best_ever: f64,
    pub last_share_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub enonce1: String,
    pub ttl_remaining_secs: u64,
}

async fn stats(State(metatron): State<Arc<Metatron>>) -> Json<PoolStats> {
    Json(PoolStats {
        hash_rate_5m: metatron.hash_rate_5m(),
        users: metatron.total_users(),
        workers: metatron.total_workers(),
        connections: metatron.total_connections(),
        accepted: metatron.accepted(),
        rejected: metatron.rejected(),
        blocks: metatron.total_blocks(),
        best_ever: metatron.best_ever().map(|d| d.as_f64()).unwrap_or(0.0),
        last_share_secs: metatron.last_share().map(|time| time.elapsed().as_secs()),
        uptime_secs: metatron.uptime().as_secs(),
    })
}

async fn users(State(metatron): State<Arc<Metatron>>) -> Json<Vec<UserSummary>> {
    Json(
        metatron
            .iter_users()
            .into_iter()
            .map(|(address, user)| UserSummary {
                address: address.to_string(),
                hash_rate_5m: user.hash_rate_5m(),
                workers: user.worker_count(),
                accepted: user.accepted(),
                rejected: user.rejected(),
                best_ever: user.best_ever().map(|d| d.as_f64()).unwrap_or(0.0),
            })
            .collect(),
    )
}

async fn user(
    State(metatron): State<Arc<Metatron>>,
    AxumPath(address): AxumPath<Address<NetworkUnchecked>>,
) -> ServerResult<Response> {
    let address = address.assume_checked();

    let user = metatron
        .get_user(&address)
        .ok_or_not_found(|| format!("User {address}"))?;

    Ok(Json(UserDetail {
        address: user.address.to_string(),
        hash_rate_5m: user.hash_rate_5m(),
        accepted: user.accepted(),
        rejected: user.rejected(),
        best_ever: user.best_ever().map(|d| d.as_f64()).unwrap_or(0.0),
        workers: user
            .workers()
            .into_iter()
            .map(|worker| WorkerSummary {
                name: worker.workername().to_string(),
                hash_rate_1m: worker.hash_rate_1m(),
                accepted: worker.accepted(),
                rejected: worker.rejected(),
                best_ever: worker.best_ever().map(|d| d.as_f64()).unwrap_or(0.0),
                last_share_secs: worker.last_share().map(|time| time.elapsed().as_secs()),
            })
            .collect(),
    })
    .into_response())
}

async fn sessions(State(metatron): State<Arc<Metatron>>) -> Json<Vec<SessionSummary>> {
    Json(
        metatron
            .sessions()
            .into_iter()
            .map(|(enonce1, remaining)| SessionSummary {
                enonce1: enonce1.to_string(),
                ttl_remaining_secs: remaining.as_secs(),
            })
            .collect(),
    )
}
