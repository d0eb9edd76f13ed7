//! Inventory listing endpoints: hosts, datastores, templates, ISO images.

use axum::extract::Query;
use axum::{Extension, Json};
use tracing::info;

use vesper_core::{inventory, VesperError};

use super::{close_session, error_response, open_session, ApiError, AppState};
use crate::api::schemas::{DatastoreInfo, ErrorResponse, HostInfo, IsoQuery, TemplateInfo};

/// List hypervisor hosts
#[utoipa::path(
    get,
    path = "/hosts",
    tag = "inventory",
    responses(
        (status = 200, description = "Host list", body = [HostInfo]),
        (status = 401, description = "Login failed", body = ErrorResponse)
    )
)]
pub async fn list_hosts(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<HostInfo>>, ApiError> {
    let session = open_session(&state).await?;
    let result = session.list_hosts().await;
    close_session(session).await;

    let records = result.map_err(|e| error_response(&e))?;
    info!("listed {} hosts", records.len());
    Ok(Json(
        records
            .iter()
            .map(inventory::host_summary)
            .map(HostInfo::from)
            .collect(),
    ))
}

/// List datastores
#[utoipa::path(
    get,
    path = "/datastores",
    tag = "inventory",
    responses(
        (status = 200, description = "Datastore list", body = [DatastoreInfo]),
        (status = 401, description = "Login failed", body = ErrorResponse)
    )
)]
pub async fn list_datastores(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<DatastoreInfo>>, ApiError> {
    let session = open_session(&state).await?;
    let result = session.list_datastores().await;
    close_session(session).await;

    let records = result.map_err(|e| error_response(&e))?;
    info!("listed {} datastores", records.len());
    Ok(Json(
        records
            .iter()
            .map(inventory::datastore_summary)
            .map(DatastoreInfo::from)
            .collect(),
    ))
}

/// List VM templates
#[utoipa::path(
    get,
    path = "/templates",
    tag = "inventory",
    responses(
        (status = 200, description = "Template list", body = [TemplateInfo]),
        (status = 401, description = "Login failed", body = ErrorResponse)
    )
)]
pub async fn list_templates(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<TemplateInfo>>, ApiError> {
    let session = open_session(&state).await?;
    let result = session.list_templates().await;
    close_session(session).await;

    let records = result.map_err(|e| error_response(&e))?;
    info!("listed {} templates", records.len());
    Ok(Json(
        records
            .iter()
            .map(inventory::template_summary)
            .map(TemplateInfo::from)
            .collect(),
    ))
}

/// List ISO images on a datastore
#[utoipa::path(
    get,
    path = "/isos",
    tag = "inventory",
    params(IsoQuery),
    responses(
        (status = 200, description = "ISO image paths", body = [String]),
        (status = 400, description = "Missing datastore parameter", body = ErrorResponse),
        (status = 404, description = "Datastore not found", body = ErrorResponse),
        (status = 504, description = "Search task timed out", body = ErrorResponse)
    )
)]
pub async fn list_isos(
    Extension(state): Extension<AppState>,
    Query(query): Query<IsoQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Some(datastore) = query.datastore else {
        return Err(error_response(&VesperError::validation(
            "datastore",
            "query parameter is required",
        )));
    };

    let session = open_session(&state).await?;
    let result = inventory::list_isos(&*session, &state.watcher, &datastore).await;
    close_session(session).await;

    let isos = result.map_err(|e| error_response(&e))?;
    info!("found {} ISO images on '{}'", isos.len(), datastore);
    Ok(Json(isos))
}
