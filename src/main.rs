//! uptrail - endpoint uptime prober
//!
//! Probes every configured endpoint once, then folds the results into the
//! JSON history read by the status page.

mod config;
mod history;
mod probe;
mod scheduler;
mod status;

use config::RunConfig;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = RunConfig::load();
    tracing::info!("Using log store at {}", cfg.log_path);

    if let Err(e) = scheduler::run(&cfg).await {
        tracing::error!("Run aborted: {}", e);
        return Err(e.into());
    }

    Ok(())
}
