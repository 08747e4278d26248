use aerobook_api::{app, AppState, AuthConfig};
use aerobook_store::{app_config::Config, open_store};
use anyhow::Context;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aerobook_api=debug,aerobook_core=debug,aerobook_store=info,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting AeroBook API on port {}", config.server.port);

    let store = open_store(&config.database, &config.ledger)
        .await
        .context("failed to open ledger store")?;

    let state = AppState::new(
        store,
        config.policy.clone(),
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    );

    if config.database.seed_sample_flights {
        let added = state
            .inventory
            .seed_sample_flights(chrono::Utc::now())
            .await
            .context("failed to seed sample flights")?;
        tracing::info!("Seeded {} sample flights", added);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("AeroBook API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
