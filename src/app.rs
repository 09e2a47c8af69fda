use crate::{
    client::DetectionClient,
    config::Config,
    notification::Notifier,
    preview::PreviewStore,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
    upload::UploadSession,
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let client = DetectionClient::new(&config.detection_service)?;
    tracing::info!("Sending detection requests to {}", client.predict_url());

    let session = UploadSession::new(client, Notifier::new(), PreviewStore::new())
        .with_model(config.detection_service.model.clone());
    let metrics = Metrics::new()?;

    let state = SharedState {
        session: Arc::new(session),
        metrics: Arc::new(metrics),
    };
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
