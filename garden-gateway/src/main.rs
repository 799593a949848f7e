use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use garden_gateway::server;
use garden_gateway::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = garden_core::Config::load()?;
    info!(
        "Configuration loaded (logseq root: {})",
        config.settings.logseq.root.display()
    );

    let db = match &config.settings.database_path {
        Some(path) => garden_db::DbPool::open(path).await?,
        None => garden_db::DbPool::new().await?,
    };
    info!("Database initialized");

    let state = AppState::new(&config, &db);
    let bind_addr = format!(
        "{}:{}",
        config.settings.gateway.host, config.settings.gateway.port
    );
    server::run(state, &bind_addr).await
}
