use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pushbeam::config::AppConfig;
use pushbeam::database;
use pushbeam::database::repositories::SqlxPusherRepository;
use pushbeam::gateway::GatewaySettings;
use pushbeam::pusher::PusherPool;
use pushbeam::stream::InMemoryEventStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pushbeam=debug,sqlx=warn")),
        )
        .init();

    let config = AppConfig::from_env();

    let db = database::init_pool(&config.database_url).await?;
    database::run_migrations(&db).await?;

    let store = Arc::new(SqlxPusherRepository::new(db));
    let stream = Arc::new(InMemoryEventStream::new());
    let settings = GatewaySettings {
        http_timeout: config.http_timeout,
    };

    let shutdown = CancellationToken::new();
    let pool = PusherPool::new(store, stream, settings, shutdown);
    pool.start().await?;
    info!("Pusher pool initialized");

    tokio::signal::ctrl_c().await?;
    pool.stop();

    Ok(())
}
