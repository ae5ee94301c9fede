use {
    super::*,
    async_trait::async_trait,
    std::io::BufWriter,
    std::fs::{File, OpenOptions},
};

const EVENT_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Event {
    Share(ShareEvent),
    BlockFound(BlockFoundEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ShareEvent {
    pub(crate) timestamp: i64,
    pub(crate) address: String,
    pub(crate) workername: String,
    pub(crate) pool_diff: f64,
    pub(crate) share_diff: f64,
    pub(crate) result: bool,
    pub(crate) blockheight: Option<i32>,
    pub(crate) reject_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BlockFoundEvent {
    pub(crate) timestamp: i64,
    pub(crate) blockheight: i32,
    pub(crate) blockhash: String,
    pub(crate) address: String,
    pub(crate) workername: String,
    pub(crate) diff: f64,
}

impl Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::Share(_) => "share",
            Event::BlockFound(_) => "block_found",
        }
    }
}

/// Builds a record sink from settings configuration. Returns `None` if
/// neither a database URL nor an events file is configured.
pub(crate) async fn build_record_sink(
    settings: &Settings,
    cancel_token: CancellationToken,
    tasks: &mut JoinSet<()>,
) -> Result<Option<mpsc::Sender<Event>>> {
    let mut sinks: Vec<Box<dyn RecordSink>> = Vec::new();

    if let Some(db_url) = settings.database_url() {
        match DatabaseSink::connect(&db_url).await {
            Ok(db_sink) => {
                info!("Database sink connected to {db_url}");
                sinks.push(Box::new(db_sink));
            }
            Err(err) => warn!("Failed to connect database sink: {err}"),
        }
    }

    if let Some(events_file) = settings.events_file() {
        let format = if events_file.extension().is_some_and(|e| e == "csv") {
            FileFormat::Csv
        } else {
            FileFormat::JsonLines
        };

        match FileSink::new(events_file.clone(), format) {
            Ok(file_sink) => {
                info!("File sink writing to {}", events_file.display());
                sinks.push(Box::new(file_sink));
            }
            Err(err) => warn!("Failed to create file sink: {err}"),
        }
    }

    if sinks.is_empty() {
        return Ok(None);
    }

    let sink: Arc<dyn RecordSink> = if sinks.len() == 1 {
        Arc::from(sinks.remove(0))
    } else {
        Arc::new(MultiSink::new(sinks))
    };

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let sink_cancel = CancellationToken::new();
    let handle = spawn_sink_consumer(rx, sink, sink_cancel.clone());

    tasks.spawn(async move {
        let _ = handle.await;
    });

    tasks.spawn({
        let cancel_token = cancel_token.clone();
        async move {
            cancel_token.cancelled().await;
            sink_cancel.cancel();
        }
    });

    Ok(Some(tx))
}

#[async_trait]
pub(crate) trait RecordSink: Send + Sync {
    async fn record(&self, event: Event) -> Result<u64>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}

struct DatabaseSink {
    pool: Pool<Postgres>,
}

impl DatabaseSink {
    async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordSink for DatabaseSink {
    async fn record(&self, event: Event) -> Result<u64> {
        let rows_changed = match event {
            Event::Share(share) => {
                sqlx::query(
                    "INSERT INTO shares (
                        blockheight, diff, sdiff, result, reject_reason,
                        workername, username, createdate
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, to_timestamp($8))",
                )
                .bind(share.blockheight)
                .bind(share.pool_diff)
                .bind(share.share_diff)
                .bind(share.result)
                .bind(&share.reject_reason)
                .bind(&share.workername)
                .bind(&share.address)
                .bind(share.timestamp)
                .execute(&self.pool)
                .await?
            }
            Event::BlockFound(block) => {
                sqlx::query(
                    "INSERT INTO blocks (
                        blockheight, blockhash, workername, username, diff, time_found
                    ) VALUES ($1, $2, $3, $4, $5, to_timestamp($6))",
                )
                .bind(block.blockheight)
                .bind(&block.blockhash)
                .bind(&block.workername)
                .bind(&block.address)
                .bind(block.diff)
                .bind(block.timestamp)
                .execute(&self.pool)
                .await?
            }
        }
        .rows_affected();

        Ok(rows_changed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum FileFormat {
    #[default]
    JsonLines,
    Csv,
}

struct FileSink {
    format: FileFormat,
    writer: std::sync::Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    fn new(path: PathBuf, format: FileFormat) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            format,
            writer: std::sync::Mutex::new(Some(BufWriter::new(file))),
        })
    }

    fn write_event(&self, event: &Event) -> Result<u64> {
        let mut guard = self.writer.lock().unwrap();
        let writer = guard.as_mut().ok_or_else(|| anyhow!("FileSink closed"))?;

        match self.format {
            FileFormat::JsonLines => {
                serde_json::to_writer(&mut *writer, event)?;
                writeln!(writer)?;
            }
            FileFormat::Csv => writeln!(writer, "{}", self.event_to_csv(event))?,
        }

        Ok(1)
    }

    fn event_to_csv(&self, event: &Event) -> String {
        match event {
            Event::Share(s) => format!(
                "{},{},{},{},{},{},{},{}",
                s.timestamp,
                "share",
                s.address,
                s.workername,
                s.pool_diff,
                s.share_diff,
                s.result,
                s.reject_reason.as_deref().unwrap_or("")
            ),
            Event::BlockFound(b) => format!(
                "{},{},{},{},{},{},{}",
                b.timestamp, "block_found", b.address, b.workername, b.blockheight, b.blockhash, b.diff
            ),
        }
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn record(&self, event: Event) -> Result<u64> {
        self.write_event(&event)
    }

    async fn flush(&self) -> Result<()> {
        let mut guard = self.writer.lock().unwrap();
        if let Some(writer) = guard.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock().unwrap();
        if let Some(mut writer) = guard.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

struct MultiSink {
    sinks: Vec<Box<dyn RecordSink>>,
}

impl MultiSink {
    fn new(sinks: Vec<Box<dyn RecordSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl RecordSink for MultiSink {
    async fn record(&self, event: Event) -> Result<u64> {
        let mut updated_records = 0;
        for sink in &self.sinks {
            updated_records = updated_records.max(sink.record(event.clone()).await?);
        }
        Ok(updated_records)
    }

    async fn flush(&self) -> Result<()> {
        for sink in &self.sinks {
            sink.flush().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for sink in &self.sinks {
            sink.close().await?;
        }
        Ok(())
    }
}

fn spawn_sink_consumer(
    mut rx: mpsc::Receiver<Event>,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    while let Ok(event) = rx.try_recv() {
                        if let Err(err) = sink.record(event).await {
                            warn!("Error recording event during shutdown: {err}");
                        }
                    }
                    if let Err(err) = sink.close().await {
                        warn!("Error closing sink: {err}");
                    }
                    break;
                }

                Some(event) = rx.recv() => {
                    if let Err(err) = sink.record(event).await {
                        warn!("Error recording event: {err}");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn test_share() -> Event {
        Event::Share(ShareEvent {
            timestamp: now(),
            address: "bc1test".into(),
            workername: "rig1".into(),
            pool_diff: 1.0,
            share_diff: 1.5,
            result: true,
            blockheight: Some(800_000),
            reject_reason: None,
        })
    }

    #[test]
    fn event_type_returns_correct_string() {
        assert_eq!(test_share().event_type(), "share");
    }

    #[test]
    fn event_serializes_to_json() {
        let json = serde_json::to_string(&test_share()).unwrap();
        assert!(json.contains("\"type\":\"share\""));
    }

    #[test]
    fn event_deserializes_from_json() {
        let json = serde_json::to_string(&test_share()).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "share");
    }

    #[tokio::test]
    async fn multi_sink_takes_the_max_across_sinks() {
        struct Counting(u64);

        #[async_trait]
        impl RecordSink for Counting {
            async fn record(&self, _event: Event) -> Result<u64> {
                Ok(self.0)
            }
        }

        let sink = MultiSink::new(vec![Box::new(Counting(1)), Box::new(Counting(3))]);
        assert_eq!(sink.record(test_share()).await.unwrap(), 3);
    }
}
