use {
    super::*,
    bouncer::{Bouncer, Consequence},
    state::{Session, State},
};

pub(crate) use session::SessionSnapshot;

mod bouncer;
mod session;
mod state;

pub(crate) struct Stratifier {
    state: State,
    socket_addr: SocketAddr,
    settings: Arc<Settings>,
    metatron: Arc<Metatron>,
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
    workbase_rx: watch::Receiver<Arc<Template>>,
    cancel_token: CancellationToken,
    jobs: Jobs,
    vardiff: Vardiff,
    bouncer: Bouncer,
    dropped_by_bouncer: bool,
    event_tx: Option<mpsc::Sender<record_sink::Event>>,
    banning_manager: Option<Arc<BanningManager>>,
    ban_counters: BanCounters,
}

impl Stratifier {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        socket_addr: SocketAddr,
        settings: Arc<Settings>,
        metatron: Arc<Metatron>,
        tcp_stream: TcpStream,
        workbase_rx: watch::Receiver<Arc<Template>>,
        cancel_token: CancellationToken,
        event_tx: Option<mpsc::Sender<record_sink::Event>>,
        start_diff: Difficulty,
        banning_manager: Option<Arc<BanningManager>>,
    ) -> Self {
        let _ = tcp_stream.set_nodelay(true);

        let (reader, writer) = tcp_stream.into_split();

        let vardiff = Vardiff::new(
            start_diff,
            settings.vardiff_period(),
            settings.vardiff_window(),
            settings.min_diff(),
            settings.max_diff(),
        );

        let bouncer = Bouncer::new(settings.disable_bouncer());

        metatron.add_connection();

        Self {
            state: State::new(),
            socket_addr,
            settings,
            metatron,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            workbase_rx,
            cancel_token,
            jobs: Jobs::new(),
            vardiff,
            bouncer,
            dropped_by_bouncer: false,
            event_tx,
            banning_manager,
            ban_counters: BanCounters::default(),
        }
    }

    /// Records a share's validity toward the process-wide ban counters and,
    /// once enough shares have accumulated to evaluate the ratio, bans and
    /// disconnects this connection if its invalid share percentage is too
    /// high.
    fn record_share_for_banning(&mut self, valid: bool) {
        let Some(manager) = &self.banning_manager else {
            return;
        };

        self.ban_counters.record(valid);

        if let Some(true) =
            self.ban_counters
                .evaluate(manager.check_threshold(), manager.invalid_percent())
        {
            manager.add_banned_ip(self.socket_addr.ip());
            self.cancel_token.cancel();
        }
    }

    fn emit_share(
        &self,
        session: &Session,
        pool_diff: Difficulty,
        share_diff: Difficulty,
        result: bool,
        reject_reason: Option<&str>,
    ) {
        let Some(ref tx) = self.event_tx else {
            return;
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let event = record_sink::Event::Share(record_sink::ShareEvent {
            timestamp,
            address: session.address.to_string(),
            workername: session.workername.clone(),
            pool_diff: pool_diff.as_f64(),
            share_diff: share_diff.as_f64(),
            result,
            blockheight: None,
            reject_reason: reject_reason.map(String::from),
        });

        let _ = tx.try_send(event);
    }

    fn emit_block_found(&self, session: &Session, blockheight: u64, blockhash: BlockHash, diff: Difficulty) {
        let Some(ref tx) = self.event_tx else {
            return;
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let event = record_sink::Event::BlockFound(record_sink::BlockFoundEvent {
            timestamp,
            blockheight: blockheight as i32,
            blockhash: blockhash.to_string(),
            address: session.address.to_string(),
            workername: session.workername.clone(),
            diff: diff.as_f64(),
        });

        let _ = tx.try_send(event);
    }

    pub(crate) async fn serve(&mut self) -> Result {
        let mut workbase_rx = self.workbase_rx.clone();
        let cancel_token = self.cancel_token.clone();
        let mut idle_check = tokio::time::interval(self.bouncer.check_interval());

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Disconnecting from {}", self.socket_addr);
                    break;
                }
                _ = idle_check.tick() => {
                    if self.bouncer.idle_check() == Consequence::Drop {
                        warn!(
                            "Dropping {} - idle for {}s",
                            self.socket_addr,
                            self.bouncer.last_interaction_since().as_secs()
                        );
                        self.dropped_by_bouncer = true;
                        break
                    }
                }
                message = self.read_message() => {
                    let Some(message) = message? else {
                        break;
                    };

                    let Message::Request { id, method, params } = message else {
                        warn!(?message, "Ignoring any notifications or responses from workers");
                        continue;
                    };

                    match method.as_str() {
                        "mining.configure" => {
                            debug!("CONFIGURE from {} with {params}", self.socket_addr);

                            let configure = serde_json::from_value::<Configure>(params)
                                .context(format!("failed to deserialize {method}"))?;

                            self.configure(id, configure).await?
                        }
                        "mining.subscribe" => {
                            debug!("SUBSCRIBE from {} with {params}", self.socket_addr);

                            let subscribe = serde_json::from_value::<Subscribe>(params)
                                .context(format!("failed to deserialize {method}"))?;

                            self.subscribe(id, subscribe).await?
                        }
                        "mining.authorize" => {
                            debug!("AUTHORIZE from {} with {params}", self.socket_addr);

                            let Some(subscription) = self.state.subscribed() else {
                                self.send_error(
                                    id.clone(),
                                    StratumErrorCode::NotSubscribed,
                                    Some(serde_json::json!({
                                        "method": "mining.authorize",
                                        "current_state": self.state.to_string()
                                    })),
                                )
                                .await?;
                                continue;
                            };

                            let authorize = serde_json::from_value::<Authorize>(params)
                                .context(format!("failed to deserialize {method}"))?;

                            self.authorize(id, authorize, subscription.enonce1).await?
                        }
                        "mining.submit" => {
                            debug!("SUBMIT from {} with params {params}", self.socket_addr);

                            let Some(session) = self.state.working() else {
                                self.send_error(id.clone(), StratumErrorCode::UnauthorizedWorker, None)
                                    .await?;
                                continue;
                            };

                            let submit = serde_json::from_value::<Submit>(params)
                                .context(format!("failed to deserialize {method}"))?;

                            if self
                                .submit(id, submit, session)
                                .await?
                                == Consequence::Drop
                            {
                                self.dropped_by_bouncer = true;
                                break;
                            }
                        }
                        method => {
                            warn!("UNKNOWN method {method} with {params} from {}", self.socket_addr);
                        }
                    }
                }

                changed = workbase_rx.changed() => {
                    if changed.is_err() {
                        warn!("Template receiver dropped, closing connection with {}", self.socket_addr);
                        break;
                    }

                    if let Some(session)= self.state.working() {
                        let workbase = workbase_rx.borrow_and_update().clone();
                        self.workbase_update(workbase, session).await?;
                    } else {
                        let _ = workbase_rx.borrow_and_update();
                        continue;
                    };

                }
            }
        }

        Ok(())
    }

    async fn handle_consequence(
        &mut self,
        consequence: Consequence,
        address: &Address,
        enonce1: &Extranonce,
    ) {
        match consequence {
            Consequence::None => {}
            Consequence::Warn => {
                info!(
                    "Warning {} - {} consecutive rejects for {}s, sending fresh job",
                    self.socket_addr,
                    self.bouncer.consecutive_rejects(),
                    self.bouncer
                        .reject_duration()
                        .map(|duration| duration.as_secs())
                        .unwrap_or(0)
                );

                let workbase = self.workbase_rx.borrow().clone();

                match workbase.create_job(
                    enonce1,
                    self.metatron.enonce2_size(),
                    Some(address),
                    self.jobs.next_id(),
                    self.state.version_mask(),
                ) {
                    Ok(job) => {
                        let new_job = Arc::new(job);
                        let clean_jobs = self.jobs.insert(new_job.clone());

                        if let Ok(notify) = new_job.notify(clean_jobs) {
                            let _ = self
                                .send(Message::Notification {
                                    method: "mining.notify".into(),
                                    params: json!(notify),
                                })
                                .await;
                        }
                    }
                    Err(err) => {
                        warn!("Failed to create job: {err}");
                    }
                }
            }
            Consequence::Reconnect => {
                info!(
                    "Suggesting reconnect to {} - {} consecutive rejects for {}s",
                    self.socket_addr,
                    self.bouncer.consecutive_rejects(),
                    self.bouncer
                        .reject_duration()
                        .map(|d| d.as_secs())
                        .unwrap_or(0)
                );
                let _ = self
                    .send(Message::Notification {
                        method: "client.reconnect".into(),
                        params: json!([]),
                    })
                    .await;
            }
            Consequence::Drop => {
                warn!(
                    "Dropping {} - {} consecutive rejects for {}s",
                    self.socket_addr,
                    self.bouncer.consecutive_rejects(),
                    self.bouncer
                        .reject_duration()
                        .map(|d| d.as_secs())
                        .unwrap_or(0)
                );
            }
        }
    }

    async fn workbase_update(&mut self, workbase: Arc<Template>, session: Arc<Session>) -> Result {
        let new_job = Arc::new(
            workbase
                .create_job(
                    &session.enonce1,
                    self.metatron.enonce2_size(),
                    Some(&session.address),
                    self.jobs.next_id(),
                    self.state.version_mask(),
                )
                .context("failed to create job for template update")?,
        );

        let clean_jobs = self.jobs.insert(new_job.clone());

        debug!("Template updated sending NOTIFY");

        self.send(Message::Notification {
            method: "mining.notify".into(),
            params: json!(new_job.notify(clean_jobs)?),
        })
        .await?;

        Ok(())
    }

    async fn configure(&mut self, id: Id, configure: Configure) -> Result {
        if configure.version_rolling_mask.is_some() {
            let version_mask = self.settings.version_mask();

            if !self.state.configure(version_mask) {
                self.send_error(
                    id,
                    StratumErrorCode::NotSubscribed,
                    Some(serde_json::json!({
                        "method": "mining.configure",
                        "current_state": self.state.to_string()
                    })),
                )
                .await?;

                return Ok(());
            }

            debug!(
                "Configuring version rolling for {} with version mask {version_mask}",
                self.socket_addr
            );

            let message = Message::Response {
                id,
                result: Some(
                    json!({"version-rolling": true, "version-rolling.mask": self.settings.version_mask()}),
                ),
                error: None,
                reject_reason: None,
            };

            self.send(message).await?;
        } else {
            warn!("Unsupported extension {:?}", configure);

            let message = Message::Response {
                id,
                result: None,
                error: Some(JsonRpcError {
                    error_code: 0,
                    message: "unsupported extension".into(),
                    traceback: Some(serde_json::json!({
                        "extensions": configure.extensions,
                        "supported": ["version-rolling"]
                    })),
                }),
                reject_reason: None,
            };

            self.send(message).await?;
        }

        Ok(())
    }

    async fn subscribe(&mut self, id: Id, subscribe: Subscribe) -> Result {
        if !self.state.not_subscribed() {
            info!("Client {} resubscribing", self.socket_addr);
            self.jobs = Jobs::new();
            self.vardiff = Vardiff::new(
                self.settings.start_diff(),
                self.settings.vardiff_period(),
                self.settings.vardiff_window(),
                self.settings.min_diff(),
                self.settings.max_diff(),
            );
        }

        let (enonce1, enonce2_size) = if let Some(ref requested_enonce1) = subscribe.enonce1 {
            let enonce1 = if let Some(session) = self.metatron.take_session(requested_enonce1) {
                info!("Resuming session for enonce1 {}", session.enonce1);
                session.enonce1
            } else {
                self.metatron.next_enonce1()
            };

            (enonce1, self.metatron.enonce2_size())
        } else {
            (self.metatron.next_enonce1(), self.metatron.enonce2_size())
        };

        let subscriptions = vec![
            (
                "mining.set_difficulty".to_string(),
                SUBSCRIPTION_ID.to_string(),
            ),
            ("mining.notify".to_string(), SUBSCRIPTION_ID.to_string()),
        ];

        let result = SubscribeResult {
            subscriptions,
            enonce1: enonce1.clone(),
            enonce2_size,
        };

        self.send(Message::Response {
            id,
            result: Some(json!(result)),
            error: None,
            reject_reason: None,
        })
        .await?;

        self.state.subscribe(enonce1, subscribe.user_agent);

        Ok(())
    }

    async fn authorize(&mut self, id: Id, authorize: Authorize, enonce1: Extranonce) -> Result {
        let address = match authorize
            .username
            .parse_with_network(self.settings.chain().network())
        {
            Ok(parsed) => parsed,
            Err(e) => {
                self.send_error(
                    id,
                    StratumErrorCode::UnauthorizedWorker,
                    Some(json!({
                        "message": e.to_string(),
                        "username": authorize.username.as_str(),
                    })),
                )
                .await?;

                return Ok(());
            }
        };

        let workbase = self.workbase_rx.borrow().clone();

        let job = Arc::new(
            workbase
                .create_job(
                    &enonce1,
                    self.metatron.enonce2_size(),
                    Some(&address),
                    self.jobs.next_id(),
                    self.state.version_mask(),
                )
                .context("failed to create job for authorize")?,
        );

        self.send(Message::Response {
            id: id.clone(),
            result: Some(json!(true)),
            error: None,
            reject_reason: None,
        })
        .await?;

        let workername = authorize.username.workername().to_string();
        if !self
            .state
            .authorize(address, workername, authorize.username)
        {
            self.send_error(
                id.clone(),
                StratumErrorCode::NotSubscribed,
                Some(serde_json::json!({
                    "method": "mining.authorize",
                    "current_state": self.state.to_string()
                })),
            )
            .await?;

            return Ok(());
        }

        self.bouncer.authorize();

        debug!("Sending SET DIFFICULTY");

        self.send(Message::Notification {
            method: "mining.set_difficulty".into(),
            params: json!(SetDifficulty(self.vardiff.current_diff())),
        })
        .await?;

        debug!("Sending NOTIFY");

        let clean_jobs = self.jobs.insert(job.clone());

        self.send(Message::Notification {
            method: "mining.notify".into(),
            params: json!(job.notify(clean_jobs)?),
        })
        .await?;

        Ok(())
    }

    async fn submit(
        &mut self,
        id: Id,
        submit: Submit,
        session: Arc<Session>,
    ) -> Result<Consequence> {
        let worker = self
            .metatron
            .get_or_create_worker(session.address.clone(), &session.workername);

        if submit.username != session.username {
            self.send_error(
                id,
                StratumErrorCode::UnauthorizedWorker,
                Some(json!({
                    "authorized": session.username.as_str(),
                    "submitted": submit.username.as_str(),
                })),
            )
            .await?;

            worker.record_rejected();
            self.record_share_for_banning(false);
            self.emit_share(
                &session,
                self.vardiff.current_diff(),
                self.vardiff.current_diff(),
                false,
                Some("unauthorized_worker"),
            );

            let consequence = self.bouncer.reject();
            self.handle_consequence(consequence, &session.address, &session.enonce1)
                .await;

            return Ok(consequence);
        }

        let Some(job) = self.jobs.get(&submit.job_id) else {
            self.send_error(id, StratumErrorCode::JobNotFound, None).await?;

            worker.record_rejected();
            self.record_share_for_banning(false);
            self.emit_share(
                &session,
                self.vardiff.current_diff(),
                self.vardiff.current_diff(),
                false,
                Some("job_not_found"),
            );

            let consequence = self.bouncer.reject();
            self.handle_consequence(consequence, &session.address, &session.enonce1)
                .await;

            return Ok(consequence);
        };

        let expected_extranonce2_size = self.metatron.enonce2_size();

        if submit.extranonce2.len() != expected_extranonce2_size {
            warn!(
                "Invalid extranonce2 length from {}: got {} bytes, expected {}",
                self.socket_addr,
                submit.extranonce2.len(),
                expected_extranonce2_size
            );

            self.send_error(
                id,
                StratumErrorCode::BadExtranonce2Size,
                Some(json!({
                    "expected": expected_extranonce2_size,
                    "received": submit.extranonce2.len()
                })),
            )
            .await?;

            worker.record_rejected();
            self.record_share_for_banning(false);
            self.emit_share(
                &session,
                self.vardiff.current_diff(),
                self.vardiff.current_diff(),
                false,
                Some("bad_extranonce2_size"),
            );

            let consequence = self.bouncer.reject();
            self.handle_consequence(consequence, &session.address, &session.enonce1)
                .await;

            return Ok(consequence);
        }

        let job_ntime = job.ntime().0;
        let submit_ntime = submit.ntime.0;
        let max_ntime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(job_ntime)
            .saturating_add(NTIME_FUTURE_TOLERANCE_SECS);

        if submit_ntime < job_ntime || submit_ntime > max_ntime {
            self.send_error(
                id,
                StratumErrorCode::NtimeOutOfRange,
                Some(json!({
                    "job_ntime": job_ntime,
                    "submit_ntime": submit_ntime,
                    "max_ntime": max_ntime,
                })),
            )
            .await?;

            worker.record_rejected();
            self.record_share_for_banning(false);
            self.emit_share(
                &session,
                self.vardiff.current_diff(),
                self.vardiff.current_diff(),
                false,
                Some("ntime_out_of_range"),
            );

            let consequence = self.bouncer.reject();
            self.handle_consequence(consequence, &session.address, &session.enonce1)
                .await;

            return Ok(consequence);
        }

        let version = if let Some(version_bits) = submit.version_bits {
            let Some(version_mask) = job.version_mask else {
                self.send_error(
                    id,
                    StratumErrorCode::BadNonceSize,
                    Some(serde_json::json!({"reason": "Version rolling not negotiated"})),
                )
                .await?;

                worker.record_rejected();
                self.record_share_for_banning(false);
                self.emit_share(
                    &session,
                    self.vardiff.current_diff(),
                    self.vardiff.current_diff(),
                    false,
                    Some("version_rolling_not_negotiated"),
                );

                let consequence = self.bouncer.reject();
                self.handle_consequence(consequence, &session.address, &session.enonce1)
                    .await;

                return Ok(consequence);
            };

            assert!(version_bits != Version::from(0));

            let disallowed = version_bits & !version_mask;

            ensure!(
                disallowed == Version::from(0),
                "miner set disallowed version bits: {disallowed}"
            );

            (job.version() & !version_mask) | (version_bits & version_mask)
        } else {
            job.version()
        };

        if self.jobs.is_duplicate_submission(
            submit.job_id,
            submit.extranonce2.clone(),
            submit.ntime,
            submit.nonce,
        ) {
            self.send_error(id, StratumErrorCode::Duplicate, None).await?;

            worker.record_rejected();
            self.record_share_for_banning(false);
            self.emit_share(
                &session,
                self.vardiff.current_diff(),
                self.vardiff.current_diff(),
                false,
                Some("duplicate_submission"),
            );

            let consequence = self.bouncer.reject();
            self.handle_consequence(consequence, &session.address, &session.enonce1)
                .await;

            return Ok(consequence);
        }

        let nbits = job.nbits();

        let header = Header {
            version: version.into(),
            prev_blockhash: job.prevhash().into(),
            merkle_root: stratum::merkle_root(
                &job.coinb1,
                &job.coinb2,
                &job.enonce1,
                &submit.extranonce2,
                job.merkle_branches(),
            )?
            .into(),
            time: submit.ntime.into(),
            bits: nbits.to_compact(),
            nonce: submit.nonce.into(),
        };

        let hash = header.block_hash();

        if self.jobs.is_duplicate(hash) {
            self.send_error(id, StratumErrorCode::Duplicate, None).await?;

            worker.record_rejected();
            self.record_share_for_banning(false);
            self.emit_share(
                &session,
                self.vardiff.current_diff(),
                Difficulty::from(hash),
                false,
                Some("duplicate"),
            );

            let consequence = self.bouncer.reject();
            self.handle_consequence(consequence, &session.address, &session.enonce1)
                .await;

            return Ok(consequence);
        }

        if let Ok(blockhash) = header.validate_pow(Target::from_compact(nbits.into())) {
            info!("Block with hash {blockhash} meets network difficulty");

            match job.workbase.build_block(&job, &submit, header) {
                Ok(block) => {
                    info!("Submitting potential block solve");

                    if self.settings.daemon_client().await?.submit_block(&block).await {
                        info!("SUCCESSFULLY mined block {}", block.block_hash());
                        self.metatron.add_block();
                        if let Some(height) = job.workbase.height() {
                            self.emit_block_found(
                                &session,
                                height,
                                block.block_hash(),
                                Difficulty::from(hash),
                            );
                        }
                    } else {
                        error!("Failed to submit block {}: all daemons rejected it", block.block_hash());
                    }
                }
                Err(err) => {
                    warn!("Failed to build block: {err}");
                }
            }
        }

        let current_diff = self.vardiff.current_diff();

        if current_diff.to_target().is_met_by(hash) {
            self.send(Message::Response {
                id,
                result: Some(json!(true)),
                error: None,
                reject_reason: None,
            })
            .await?;

            let share_diff = Difficulty::from(hash);

            worker.record_accepted(current_diff, share_diff);
            self.emit_share(&session, current_diff, share_diff, true, None);
            self.record_share_for_banning(true);

            self.bouncer.accept();

            let network_diff = Difficulty::from(job.nbits());

            debug!(
                "Share accepted from {} | diff={}",
                self.socket_addr, current_diff,
            );

            if let Some(new_diff) = self.vardiff.record_share(current_diff, network_diff) {
                debug!(
                    "Adjusting difficulty {} -> {} for {} | period={}s",
                    current_diff,
                    new_diff,
                    self.socket_addr,
                    self.settings.vardiff_period().as_secs_f64()
                );

                self.send(Message::Notification {
                    method: "mining.set_difficulty".into(),
                    params: json!(SetDifficulty(new_diff)),
                })
                .await?;
            }

            return Ok(Consequence::None);
        }

        self.send_error(id, StratumErrorCode::LowDiff, None).await?;

        worker.record_rejected();
        self.record_share_for_banning(false);
        self.emit_share(
            &session,
            current_diff,
            Difficulty::from(hash),
            false,
            Some("low_diff"),
        );

        let consequence = self.bouncer.reject();
        self.handle_consequence(consequence, &session.address, &session.enonce1)
            .await;

        Ok(consequence)
    }

    async fn read_message(&mut self) -> Result<Option<Message>> {
        match self.reader.next().await {
            Some(Ok(line)) => {
                let message = serde_json::from_str::<Message>(&line).map_err(|e| {
                    anyhow!(
                        "invalid stratum message from {}: {e}; line={line:?}",
                        self.socket_addr
                    )
                })?;
                Ok(Some(message))
            }
            Some(Err(e)) => Err(anyhow!("read error from {}: {e}", self.socket_addr)),
            None => {
                info!("Connection {} disconnected", self.socket_addr);
                Ok(None)
            }
        }
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        let frame = serde_json::to_string(&message)?;
        self.writer.send(frame).await?;
        Ok(())
    }

    async fn send_error(
        &mut self,
        id: Id,
        error: StratumErrorCode,
        traceback: Option<serde_json::Value>,
    ) -> Result {
        self.send(Message::Response {
            id,
            result: None,
            error: Some(error.into_response(traceback)),
            reject_reason: None,
        })
        .await
    }
}

impl Drop for Stratifier {
    fn drop(&mut self) {
        if !self.dropped_by_bouncer
            && let Some(session) = self.state.working()
        {
            self.metatron
                .store_session(SessionSnapshot::new(session.enonce1.clone()));
        }

        self.metatron.sub_connection();

        info!(
            "Shutting down stratifier for {} (remaining: {})",
            self.socket_addr,
            self.metatron.total_connections()
        );
    }
}
