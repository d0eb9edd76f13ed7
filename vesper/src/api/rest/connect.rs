//! Liveness and connection-verification endpoints.

use axum::{Extension, Json};
use tracing::{info, warn};

use vesper_core::config::EndpointConfig;

use super::{error_response, ApiError, AppState};
use crate::api::schemas::{ConnectRequest, ConnectResponse, ErrorResponse, HealthResponse};

/// Service liveness
#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Verify explicit credentials against an endpoint
#[utoipa::path(
    post,
    path = "/connect",
    tag = "service",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Connection successful", body = ConnectResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 502, description = "Endpoint unreachable", body = ErrorResponse)
    )
)]
pub async fn test_connection(
    Extension(state): Extension<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let endpoint = EndpointConfig {
        host: request.host,
        port: request.port,
        username: request.user,
        password: request.password,
        insecure_tls: state.config.endpoint.insecure_tls,
    };
    info!("connection test for {}", endpoint.display_name());

    let session = state
        .connector
        .connect(&endpoint)
        .await
        .map_err(|e| error_response(&e))?;

    let about = match session.about().await {
        Ok(about) => about,
        Err(e) => {
            if let Err(logout_err) = session.logout().await {
                warn!("logout after failed about() also failed: {}", logout_err);
            }
            return Err(error_response(&e));
        }
    };
    if let Err(e) = session.logout().await {
        warn!("logout after connection test failed: {}", e);
    }

    info!(
        "connection test for {} succeeded ({}, API {})",
        endpoint.display_name(),
        about.subtype(),
        about.api_version
    );
    Ok(Json(ConnectResponse {
        status: "success".to_string(),
        message: "Connection successful".to_string(),
        vsphere_subtype: about.subtype().to_string(),
        api_version: about.api_version,
    }))
}
