use super::*;

pub(crate) mod error;

/// Binds and serves `router` until `cancel_token` fires, matching the
/// teacher's `axum_server::Handle`-based graceful shutdown shape. A no-op
/// when no `http_port` is configured.
pub(crate) fn spawn(
    settings: &Settings,
    router: Router,
    cancel_token: CancellationToken,
    tasks: &mut JoinSet<()>,
) -> Result<()> {
    let Some(http_port) = settings.http_port() else {
        return Ok(());
    };

    let addr = (settings.address(), http_port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("failed to resolve address {}:{}", settings.address(), http_port))?;

    let listener = std::net::TcpListener::bind(addr)
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;
    listener.set_nonblocking(true)?;

    let handle = Handle::new();

    let shutdown_handle = handle.clone();
    tasks.spawn(async move {
        cancel_token.cancelled().await;
        info!("Received shutdown signal, stopping HTTP server...");
        shutdown_handle.shutdown();
    });

    info!("HTTP status API listening on http://{addr}");

    tasks.spawn(async move {
        if let Err(err) = axum_server::from_tcp(listener)
            .handle(handle)
            .serve(router.into_make_service())
            .await
        {
            error!("HTTP server error: {err}");
        }
    });

    Ok(())
}
