use super::*;

/// Redundant fan-out client over one or more bitcoind JSON-RPC endpoints.
/// The first entry is the primary daemon; the rest are fallbacks tried
/// only when the primary doesn't answer.
pub(crate) struct DaemonClient {
    clients: Vec<Client>,
}

impl DaemonClient {
    pub(crate) fn new(clients: Vec<Client>) -> Result<Self> {
        ensure!(
            !clients.is_empty(),
            "daemon fan-out client requires at least one daemon"
        );

        Ok(Self { clients })
    }

    /// Tries daemons in order, returning the index of the first one that
    /// answers (even with a JSON-RPC error). Only fails when every daemon
    /// is unreachable.
    pub(crate) async fn cmd<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<(usize, T)> {
        let mut last_err = None;

        for (index, client) in self.clients.iter().enumerate() {
            match client.call::<T>(method, params).await {
                Ok(response) => return Ok((index, response)),
                Err(err) => {
                    warn!("daemon {index} unreachable for {method}: {err}");
                    last_err = Some(err);
                }
            }
        }

        Err(anyhow!(
            "all daemons unreachable for {method}: {}",
            last_err.expect("clients is non-empty")
        ))
    }

    /// Parallel dispatch to every daemon; an unreachable daemon yields
    /// `None` instead of failing the whole call.
    pub(crate) async fn cmd_all<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Vec<Option<T>> {
        futures::future::join_all(self.clients.iter().map(|client| client.call::<T>(method, params)))
            .await
            .into_iter()
            .map(|result| result.ok())
            .collect()
    }

    /// Sends a JSON-RPC batch to the first reachable daemon. `bitcoind_async_client`
    /// has no native batch call, so this sends each request in sequence to
    /// whichever daemon answers the first one.
    pub(crate) async fn batch_cmd<T: serde::de::DeserializeOwned>(
        &self,
        calls: &[(&str, Vec<Value>)],
    ) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(calls.len());

        let Some((method, params)) = calls.first() else {
            return Ok(results);
        };

        let (index, first) = self.cmd::<T>(method, params).await?;
        results.push(first);

        for (method, params) in &calls[1..] {
            results.push(self.clients[index].call::<T>(method, params).await?);
        }

        Ok(results)
    }

    pub(crate) async fn get_block_template(&self, rules: &[&str]) -> Result<Template> {
        let params = json!({
            "capabilities": ["coinbasetxn", "workid", "coinbase/append"],
            "rules": rules,
        });

        let (_, template) = self
            .cmd::<Template>("getblocktemplate", &[params])
            .await
            .context("getblocktemplate failed")?;

        Ok(template)
    }

    /// Submits to every daemon; logs each outcome individually and never
    /// aborts because one daemon rejected or errored. Returns true if at
    /// least one daemon accepted the block.
    pub(crate) async fn submit_block(&self, block: &Block) -> bool {
        let mut accepted = false;

        for (index, client) in self.clients.iter().enumerate() {
            match client.submit_block(block).await {
                Ok(_) => {
                    info!("daemon {index} accepted submitblock");
                    accepted = true;
                }
                Err(err) => warn!("daemon {index} submitblock failed: {err}"),
            }
        }

        accepted
    }

    pub(crate) async fn is_all_online(&self) -> bool {
        self.cmd_all::<Value>("getpeerinfo", &[])
            .await
            .iter()
            .all(Option::is_some)
    }
}
