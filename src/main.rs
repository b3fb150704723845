/// IMF Gadgets - gadget inventory API server
use anyhow::Context;
use imf_gadgets::{config::{LoggingConfig, ServerConfig}, server, AppContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.service.environment,
        "Starting IMF gadget API"
    );

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application context")?;

    // Start server
    server::serve(ctx).await.context("Server terminated with an error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
