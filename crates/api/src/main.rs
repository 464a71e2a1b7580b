use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxroom_api::{build_router, state::AppState};
use voxroom_config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "voxroom_api=debug,voxroom_services=debug,voxroom_store=debug,tower_http=info"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Fail-fast: invalid environment never reaches the event loop.
    let settings = Settings::load()?;
    info!(
        "Starting voxroom on {}:{} as {}",
        settings.app.host, settings.app.port, settings.app.node_id
    );

    voxroom_services::metrics::register_metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // AppState::new spawns the mediasoup workers and background loops.
    let (app_state, background_tasks) = AppState::new(settings.clone(), shutdown_rx.clone()).await?;
    let app = build_router(app_state);

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    // Serving stops once the watch flips: the listener closes and every
    // socket loop observes the flag and disconnects its client.
    let mut serve_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await?;

    // Background loops finish their final work (gift flush included)
    // within the overall deadline; past it, force exit.
    let deadline = Duration::from_secs(settings.app.shutdown_timeout_secs);
    if tokio::time::timeout(deadline, futures::future::join_all(background_tasks))
        .await
        .is_err()
    {
        warn!("shutdown deadline exceeded, forcing exit");
        std::process::exit(1);
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(%e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(%e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
