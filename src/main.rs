use std::{net::SocketAddr, sync::Arc};

use sea_orm_migration::MigratorTrait;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storefront_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone())),
        )
        .init();

    let db = api::db::establish_connection_with_config(&api::db::DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        ..Default::default()
    })
    .await?;

    if cfg.auto_migrate {
        api::migrator::Migrator::up(&db, None).await.map_err(|e| {
            error!("failed running migrations: {}", e);
            e
        })?;
    }

    let db = Arc::new(db);
    let config = Arc::new(cfg);

    let (event_sender, event_rx) = api::events::EventSender::channel(config.event_queue_capacity);
    api::events::spawn_event_worker(event_rx, Arc::new(api::events::TracingNotificationSink));

    let services = api::handlers::AppServices::new(db.clone(), config.clone(), event_sender.clone());

    // Background sweeps: abandoned payment expiry and ledger pruning
    let reaper_handles = api::services::reaper::spawn_reaper(services.reaper.clone());

    let state = api::AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };

    let app = api::app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, environment = %config.environment, "storefront-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in reaper_handles {
        handle.abort();
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
