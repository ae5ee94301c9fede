use crate::record_sink::build_record_sink;
use {
    super::*,
    crate::{api, http_server},
};

#[derive(Parser, Debug)]
pub(crate) struct Pool {
    #[command(flatten)]
    pub(crate) options: PoolOptions,
}

impl Pool {
    pub(crate) async fn run(&self, cancel_token: CancellationToken) -> Result {
        let mut tasks = JoinSet::new();

        let settings = Arc::new(
            Settings::from_pool_options(self.options.clone())
                .context("failed to create settings")?,
        );

        let workbase_rx = spawn_generator(settings.clone(), cancel_token.clone(), &mut tasks)
            .await
            .context("failed to subscribe to ZMQ block notifications")?;

        let extranonces = Extranonces::Pool(
            PoolExtranonces::new(settings.enonce1_size(), settings.enonce2_size())
                .context("invalid extranonce configuration")?,
        );

        let metatron = Arc::new(Metatron::new(extranonces));
        metatron.clone().spawn(cancel_token.clone(), &mut tasks);

        http_server::spawn(
            &settings,
            api::router(metatron.clone()),
            cancel_token.clone(),
            &mut tasks,
        )?;

        let event_tx = build_record_sink(&settings, cancel_token.clone(), &mut tasks)
            .await
            .context("failed to build record sink")?;

        let banning_manager = if settings.disable_banning() {
            None
        } else {
            let manager = BanningManager::new(
                settings.ban_time(),
                settings.ban_purge_interval(),
                settings.ban_check_threshold(),
                settings.ban_invalid_percent(),
            );
            manager.spawn_purge_task(cancel_token.child_token());
            Some(manager)
        };

        let address = settings.address();
        let port = settings.port();

        let listener = TcpListener::bind((address, port))
            .await
            .with_context(|| format!("failed to bind to {address}:{port}"))?;

        info!("Stratum server listening on {address}:{port}");

        let high_diff_listener = if let Some(high_diff_port) = settings.high_diff_port() {
            let listener = TcpListener::bind((address, high_diff_port))
                .await
                .with_context(|| format!("failed to bind to {address}:{high_diff_port}"))?;

            info!(
                "Stratum high-diff server listening on {address}:{high_diff_port} \
                 (starting difficulty {})",
                settings.high_diff_start()
            );

            Some(listener)
        } else {
            None
        };

        if !integration_test() && !logs_enabled() {
            spawn_throbber(metatron.clone(), cancel_token.clone(), &mut tasks);
        }

        let spawn_stratifier = |tasks: &mut JoinSet<()>,
                                addr: SocketAddr,
                                stream: TcpStream,
                                start_diff: Difficulty,
                                workbase_rx: watch::Receiver<Arc<Template>>,
                                settings: Arc<Settings>,
                                metatron: Arc<Metatron>,
                                conn_cancel_token: CancellationToken,
                                event_tx: Option<mpsc::Sender<record_sink::Event>>,
                                banning_manager: Option<Arc<BanningManager>>| {
            info!("Spawning stratifier task for {addr}");

            tasks.spawn(async move {
                let mut stratifier = Stratifier::new(
                    addr,
                    settings,
                    metatron,
                    stream,
                    workbase_rx,
                    conn_cancel_token,
                    event_tx,
                    start_diff,
                    banning_manager,
                );

                if let Err(err) = stratifier.serve().await {
                    error!("Stratifier error: {err}")
                }
            });
        };

        loop {
            tokio::select! {
                Ok((stream, addr)) = listener.accept() => {
                    if banning_manager.as_ref().is_some_and(|manager| manager.check_ban(addr.ip())) {
                        debug!("Rejecting connection from banned ip {}", addr.ip());
                        continue;
                    }

                    spawn_stratifier(
                        &mut tasks,
                        addr,
                        stream,
                        settings.start_diff(),
                        workbase_rx.clone(),
                        settings.clone(),
                        metatron.clone(),
                        cancel_token.child_token(),
                        event_tx.clone(),
                        banning_manager.clone(),
                    );
                }
                Ok((stream, addr)) = async {
                    match &high_diff_listener {
                        Some(listener) => listener.accept().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if banning_manager.as_ref().is_some_and(|manager| manager.check_ban(addr.ip())) {
                        debug!("Rejecting connection from banned ip {}", addr.ip());
                        continue;
                    }

                    spawn_stratifier(
                        &mut tasks,
                        addr,
                        stream,
                        settings.high_diff_start(),
                        workbase_rx.clone(),
                        settings.clone(),
                        metatron.clone(),
                        cancel_token.child_token(),
                        event_tx.clone(),
                        banning_manager.clone(),
                    );
                }
                _ = cancel_token.cancelled() => {
                    info!("Shutting down stratum server");
                    break;
                }
            }
        }

        info!("Waiting for {} tasks to complete...", tasks.len());
        while tasks.join_next().await.is_some() {}
        info!("All pool tasks stopped");

        Ok(())
    }
}
