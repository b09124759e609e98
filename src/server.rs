//! HTTP server for the analysis service

use crate::analysis::NlpService;
use crate::error::ServiceError;
use crate::routes;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<NlpService>,
    pub request_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: Arc<NlpService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
            start_time: Instant::now(),
        }
    }

    /// Runs `f` on the blocking pool, bounded by the request timeout. Model
    /// inference and corpus loading never run on the async workers.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&NlpService) -> T + Send + 'static,
        T: Send + 'static,
    {
        let service = self.service.clone();
        let task = tokio::task::spawn_blocking(move || f(&service));

        match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ServiceError::Worker(e.to_string())),
            Err(_) => Err(ServiceError::Timeout(self.request_timeout.as_secs())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::analysis_routes())
        .merge(routes::memory_routes())
        .merge(routes::nlp_routes())
        .merge(routes::admin_routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server
pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("🚀 Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
