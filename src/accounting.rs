use {super::*, async_trait::async_trait};

#[derive(Debug, Clone)]
pub(crate) struct ShareRecord {
    pub(crate) address: String,
    pub(crate) workername: String,
    pub(crate) diff: Difficulty,
}

/// Query-side collaborator over the pool's share/block history. `record_sink`
/// owns the append-only write path into the same `shares`/`blocks` tables;
/// this trait is the read side used for payout contribution and hashrate
/// reporting.
#[async_trait]
pub(crate) trait Accounting: Send + Sync {
    async fn put_share(&self, share: &ShareRecord, accepted: bool, height: Option<i32>)
    -> Result<()>;

    async fn get_round_contrib(&self, height: i32) -> Result<HashMap<String, f64>>;

    async fn get_pool_hashrate(&self, from: i64, to: i64) -> Result<f64>;

    async fn get_miner_hashrate(&self, address: &str, from: i64, to: i64) -> Result<f64>;

    async fn get_rig_hashrate(
        &self,
        address: &str,
        workername: &str,
        from: i64,
        to: i64,
    ) -> Result<f64>;

    async fn get_miner_index(&self) -> Result<Vec<String>>;

    async fn get_rig_index(&self, address: &str) -> Result<Vec<String>>;
}

pub(crate) struct PostgresAccounting {
    pool: Pool<Postgres>,
}

impl PostgresAccounting {
    pub(crate) async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Sum of `sdiff` (per-share difficulty) between two unix timestamps,
    /// divided by the window length, gives an estimated hashrate in
    /// difficulty-units/sec; callers convert to H/s as needed.
    async fn hashrate_for(&self, filter: &str, bind: Option<&str>, from: i64, to: i64) -> Result<f64> {
        let sum: Option<f64> = if let Some(bind) = bind {
            sqlx::query_scalar(&format!(
                "SELECT sum(sdiff) FROM shares WHERE result = true AND createdate >= to_timestamp($1) \
                 AND createdate < to_timestamp($2) AND {filter} = $3"
            ))
            .bind(from)
            .bind(to)
            .bind(bind)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                "SELECT sum(sdiff) FROM shares WHERE result = true AND createdate >= to_timestamp($1) \
                 AND createdate < to_timestamp($2)",
            )
            .bind(from)
            .bind(to)
            .fetch_one(&self.pool)
            .await?
        };

        let window = (to - from).max(1) as f64;
        Ok(sum.unwrap_or(0.0) / window)
    }
}

#[async_trait]
impl Accounting for PostgresAccounting {
    async fn put_share(
        &self,
        share: &ShareRecord,
        accepted: bool,
        height: Option<i32>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO shares (blockheight, diff, sdiff, result, workername, username, createdate) \
             VALUES ($1, $2, $2, $3, $4, $5, now())",
        )
        .bind(height)
        .bind(share.diff.as_f64())
        .bind(accepted)
        .bind(&share.workername)
        .bind(&share.address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_round_contrib(&self, height: i32) -> Result<HashMap<String, f64>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT username, sum(sdiff) FROM shares \
             WHERE result = true AND blockheight <= $1 \
             AND blockheight > coalesce((SELECT max(blockheight) FROM blocks WHERE blockheight < $1), 0) \
             GROUP BY username",
        )
        .bind(height)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn get_pool_hashrate(&self, from: i64, to: i64) -> Result<f64> {
        self.hashrate_for("username", None, from, to).await
    }

    async fn get_miner_hashrate(&self, address: &str, from: i64, to: i64) -> Result<f64> {
        self.hashrate_for("username", Some(address), from, to).await
    }

    async fn get_rig_hashrate(
        &self,
        address: &str,
        workername: &str,
        from: i64,
        to: i64,
    ) -> Result<f64> {
        let sum: Option<f64> = sqlx::query_scalar(
            "SELECT sum(sdiff) FROM shares WHERE result = true AND createdate >= to_timestamp($1) \
             AND createdate < to_timestamp($2) AND username = $3 AND workername = $4",
        )
        .bind(from)
        .bind(to)
        .bind(address)
        .bind(workername)
        .fetch_one(&self.pool)
        .await?;

        let window = (to - from).max(1) as f64;
        Ok(sum.unwrap_or(0.0) / window)
    }

    async fn get_miner_index(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT username FROM shares ORDER BY username")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(address,)| address).collect())
    }

    async fn get_rig_index(&self, address: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT workername FROM shares WHERE username = $1 ORDER BY workername",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(workername,)| workername).collect())
    }
}
