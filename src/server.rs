use crate::{
    client::Detector, config::ServerConfig, routes::api_routes, telemetry::Metrics,
    upload::UploadSession,
};
use axum::Router;
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

pub struct SharedState<D: Detector> {
    pub session: Arc<UploadSession<D>>,
    pub metrics: Arc<Metrics>,
}

impl<D: Detector> Clone for SharedState<D> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn build_router<D: Detector>(state: SharedState<D>) -> Router {
    Router::new().merge(api_routes::<D>()).with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<D: Detector>(
        state: SharedState<D>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = config.get_address();
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let router = build_router(state).layer(metrics_layer);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}
