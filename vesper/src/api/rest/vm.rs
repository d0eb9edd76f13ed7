//! VM endpoints: listing, details, metrics, power and provisioning.

use axum::extract::Path;
use axum::{Extension, Json};
use tracing::info;

use vesper_core::types::{PowerAction, ProvisioningRequest};
use vesper_core::{inventory, power, VesperError};

use super::{
    close_session, error_response, open_session, provision_error_response, ApiError, AppState,
};
use crate::api::schemas::{
    CreateVmRequest, CreateVmResponse, ErrorResponse, OperationResponse, PowerRequest,
    VmDetailInfo, VmInfo, VmMetricsInfo,
};

/// List virtual machines
#[utoipa::path(
    get,
    path = "/vms",
    tag = "vm",
    responses(
        (status = 200, description = "VM list", body = [VmInfo]),
        (status = 401, description = "Login failed", body = ErrorResponse)
    )
)]
pub async fn list_vms(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<VmInfo>>, ApiError> {
    let session = open_session(&state).await?;
    let result = session.list_virtual_machines().await;
    close_session(session).await;

    let records = result.map_err(|e| error_response(&e))?;
    info!("listed {} virtual machines", records.len());
    Ok(Json(
        records
            .iter()
            .map(inventory::vm_summary)
            .map(VmInfo::from)
            .collect(),
    ))
}

/// Details for one VM by BIOS UUID
#[utoipa::path(
    get,
    path = "/vms/{uuid}",
    tag = "vm",
    params(("uuid" = String, Path, description = "BIOS UUID of the VM")),
    responses(
        (status = 200, description = "VM details", body = VmDetailInfo),
        (status = 404, description = "VM not found", body = ErrorResponse)
    )
)]
pub async fn vm_details(
    Extension(state): Extension<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<VmDetailInfo>, ApiError> {
    let uuid = uuid.trim().to_string();
    let session = open_session(&state).await?;
    let result = session.find_vm_by_uuid(&uuid).await;
    close_session(session).await;

    let record = result
        .map_err(|e| error_response(&e))?
        .ok_or_else(|| not_found_vm(&uuid))?;
    Ok(Json(inventory::vm_details(&record).into()))
}

/// Quick-stats metrics for one VM
#[utoipa::path(
    get,
    path = "/vms/{uuid}/metrics",
    tag = "vm",
    params(("uuid" = String, Path, description = "BIOS UUID of the VM")),
    responses(
        (status = 200, description = "VM metrics", body = VmMetricsInfo),
        (status = 404, description = "VM not found", body = ErrorResponse)
    )
)]
pub async fn vm_metrics(
    Extension(state): Extension<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<VmMetricsInfo>, ApiError> {
    let uuid = uuid.trim().to_string();
    let session = open_session(&state).await?;
    let result = session.find_vm_by_uuid(&uuid).await;
    close_session(session).await;

    let record = result
        .map_err(|e| error_response(&e))?
        .ok_or_else(|| not_found_vm(&uuid))?;
    Ok(Json(inventory::vm_metrics(&record).into()))
}

/// Power a VM on or off
#[utoipa::path(
    post,
    path = "/vms/{uuid}/power",
    tag = "vm",
    params(("uuid" = String, Path, description = "BIOS UUID of the VM")),
    request_body = PowerRequest,
    responses(
        (status = 200, description = "Power state changed", body = OperationResponse),
        (status = 400, description = "Invalid action", body = ErrorResponse),
        (status = 404, description = "VM not found", body = ErrorResponse),
        (status = 504, description = "Task timed out", body = ErrorResponse)
    )
)]
pub async fn power_vm(
    Extension(state): Extension<AppState>,
    Path(uuid): Path<String>,
    Json(request): Json<PowerRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let action = match request.action.as_str() {
        "on" => PowerAction::On,
        "off" => PowerAction::Off,
        other => {
            return Err(error_response(&VesperError::validation(
                "action",
                format!("'{}' is not a valid action (expected 'on' or 'off')", other),
            )))
        }
    };

    let uuid = uuid.trim().to_string();
    let session = open_session(&state).await?;
    let result = power::apply_power(&*session, &state.watcher, &uuid, action).await;
    close_session(session).await;

    result.map_err(|e| error_response(&e))?;
    Ok(Json(OperationResponse::success()))
}

/// Provision a new VM from a template or boot media
#[utoipa::path(
    post,
    path = "/vms",
    tag = "vm",
    request_body = CreateVmRequest,
    responses(
        (status = 200, description = "VM provisioned", body = CreateVmResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Template, datastore or network not found", body = ErrorResponse),
        (status = 500, description = "Remote task failed", body = ErrorResponse),
        (status = 504, description = "Task timed out", body = ErrorResponse)
    )
)]
pub async fn create_vm(
    Extension(state): Extension<AppState>,
    Json(request): Json<CreateVmRequest>,
) -> Result<Json<CreateVmResponse>, ApiError> {
    let request: ProvisioningRequest = request.into();
    info!("provisioning request for '{}'", request.name);

    let session = open_session(&state).await?;
    let result = state.provisioner.provision(&*session, &request).await;
    close_session(session).await;

    let outcome = result.map_err(|failure| provision_error_response(&failure))?;
    Ok(Json(outcome.into()))
}

fn not_found_vm(uuid: &str) -> ApiError {
    error_response(&VesperError::not_found(format!("VM with UUID {}", uuid)))
}
