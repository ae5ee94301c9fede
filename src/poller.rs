use super::*;

/// How often to re-fetch a template even without a ZMQ hashblock hint, as
/// a fallback in case the notification is ever missed.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

async fn get_block_template(settings: &Settings) -> Result<Template> {
    info!("Fetching new block template");

    let mut rules = vec!["segwit"];
    if settings.chain().network() == Network::Signet {
        rules.push("signet");
    }

    let template = settings
        .daemon_client()
        .await?
        .get_block_template(&rules)
        .await?;

    Ok(template.with_merkle_branches())
}

/// Fetches an initial template, then spawns a background task that
/// refetches either on a ZMQ `hashblock` notification or, failing that,
/// on a fixed poll interval.
pub(crate) async fn spawn_generator(
    settings: Arc<Settings>,
    cancel_token: CancellationToken,
    tasks: &mut JoinSet<()>,
) -> Result<watch::Receiver<Arc<Template>>> {
    let initial = get_block_template(&settings).await?;

    let (tx, rx) = watch::channel(Arc::new(initial));

    tasks.spawn(async move {
        let mut zmq = match Zmq::connect(settings.clone()).await {
            Ok(zmq) => Some(zmq),
            Err(err) => {
                warn!("Continuing without ZMQ block notifications: {err}");
                None
            }
        };

        let mut poll_ticker = interval(POLL_INTERVAL);
        poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Shutting down block template generator");
                    break;
                }
                _ = poll_ticker.tick() => {}
                result = async { zmq.as_mut().unwrap().recv_blockhash().await }, if zmq.is_some() => {
                    match result {
                        Ok(blockhash) => info!("New block {blockhash} via ZMQ, refetching template"),
                        Err(err) => {
                            warn!("ZMQ connection lost, falling back to polling: {err}");
                            zmq = None;
                        }
                    }
                }
            }

            match get_block_template(&settings).await {
                Ok(template) => {
                    tx.send_replace(Arc::new(template));
                }
                Err(err) => warn!("Failed to fetch block template: {err}"),
            }
        }
    });

    Ok(rx)
}
