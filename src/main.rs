use anyhow::{Context, Result};
use bidledger::{
    clock::SystemClock,
    config::Config,
    http,
    notify::TracingNotifier,
    persistence::{InMemoryPersistence, Persistence, PostgresPersistence},
    Engine,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{runtime::Runtime, sync::oneshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve<P>(
    engine: Engine<P>,
    addr: SocketAddr,
    stop: oneshot::Receiver<()>,
) -> Result<()>
where
    P: Persistence + 'static,
{
    info!(%addr, "starting http server");
    axum::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {addr}"))?
        .serve(http::router(Arc::new(engine)).into_make_service())
        .with_graceful_shutdown(async {
            // a dropped sender stops the server just the same
            let _ = stop.await;
        })
        .await
        .context("http server failed")?;
    info!("http server stopped");
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_filter);

    let (stop_tx, stop_rx) = oneshot::channel();
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        eprintln!("Stopping all services...");
        if let Some(stop_tx) = stop_tx.take() {
            let _ = stop_tx.send(());
        }
    })?;

    let runtime = Runtime::new()?;
    let notifier = TracingNotifier::new_shared();
    let clock = Arc::new(SystemClock);
    let rules = config.bid_rules();

    match config.database_url.as_deref() {
        Some(url) => {
            let persistence = PostgresPersistence::connect(url)?;
            persistence.migrate().context("Failed to create the schema")?;
            info!("using postgres storage");
            runtime.block_on(serve(
                Engine::new(persistence, notifier, clock, rules),
                config.listen_addr,
                stop_rx,
            ))
        }
        None => {
            info!("using in-memory storage");
            runtime.block_on(serve(
                Engine::new(InMemoryPersistence::new(), notifier, clock, rules),
                config.listen_addr,
                stop_rx,
            ))
        }
    }
}
