//! Running-average demo — Binary Entrypoint
//! Starts a simulated cluster of streaming nodes, the periodic global reduce,
//! and the HTTP surface. Ctrl-C stops everything gracefully.

use anyhow::Context;
use running_average::{api, metrics::Metrics, Config, Runtime};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("running_average=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load_default().context("loading configuration")?;

    println!();
    println!(">>> Streaming running average example started.");
    println!(
        ">>> {} node(s), window {}, values in [0, {}). Press Ctrl-C to stop.",
        cfg.nodes, cfg.window_capacity, cfg.value_range
    );

    // Recorder first, so nodes started below report into it.
    let metrics = if cfg.metrics {
        Some(Metrics::init().context("installing prometheus recorder")?)
    } else {
        None
    };

    let runtime = Runtime::start(&cfg);

    let mut readouts = runtime.readout();
    tokio::spawn(async move {
        while readouts.changed().await.is_ok() {
            if let Some(readout) = readouts.borrow_and_update().clone() {
                println!("{readout}");
            }
        }
    });

    let mut router = api::create_router(runtime.state());
    if let Some(metrics) = &metrics {
        router = router.merge(metrics.router());
    }

    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    tracing::info!(bind = %cfg.bind, "http listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "ctrl-c handler failed; shutting down");
            }
        })
        .await
        .context("http server")?;

    runtime.shutdown().await;
    Ok(())
}
