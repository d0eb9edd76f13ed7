//! Handler shared state and error mapping.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use tracing::warn;

use vesper_core::config::Config;
use vesper_core::provision::{ProvisionFailure, Provisioner};
use vesper_core::task_watcher::TaskWatcher;
use vesper_core::vim::connector::SessionGuard;
use vesper_core::vim::session::VimConnector;
use vesper_core::VesperError;

use super::schemas::ErrorResponse;

pub mod connect;
pub mod inventory;
pub mod vm;

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn VimConnector>,
    pub config: Arc<Config>,
    pub watcher: Arc<TaskWatcher>,
    pub provisioner: Arc<Provisioner>,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn VimConnector>,
        config: Arc<Config>,
        watcher: Arc<TaskWatcher>,
    ) -> Self {
        let provisioner = Arc::new(Provisioner::new(
            watcher.clone(),
            config.provision.clone(),
        ));
        Self {
            connector,
            config,
            watcher,
            provisioner,
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(err: &VesperError) -> ApiError {
    (error_status(err), Json(ErrorResponse::new(err.to_string())))
}

fn error_status(err: &VesperError) -> StatusCode {
    match err {
        VesperError::Validation { .. } => StatusCode::BAD_REQUEST,
        VesperError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
        VesperError::NotFound { .. } => StatusCode::NOT_FOUND,
        VesperError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        VesperError::Transport { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn provision_error_response(failure: &ProvisionFailure) -> ApiError {
    (
        error_status(&failure.source),
        Json(ErrorResponse {
            error: failure.to_string(),
            step: Some(failure.step.to_string()),
            vm_id: failure.vm.as_ref().map(|vm| vm.id.clone()),
        }),
    )
}

/// Open a scoped session against the configured endpoint.
pub async fn open_session(state: &AppState) -> Result<SessionGuard, ApiError> {
    state
        .connector
        .connect(&state.config.endpoint)
        .await
        .map(SessionGuard::new)
        .map_err(|e| error_response(&e))
}

/// Release a scoped session, logging instead of failing the request.
pub async fn close_session(guard: SessionGuard) {
    if let Err(e) = guard.close().await {
        warn!("session logout failed: {}", e);
    }
}
