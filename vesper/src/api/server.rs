//! Router assembly.

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vesper_core::config::ServerConfig;

use super::docs::ApiDoc;
use super::rest::{connect, inventory, vm, AppState};

pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(connect::health))
        .route("/connect", post(connect::test_connection))
        .route("/vms", get(vm::list_vms).post(vm::create_vm))
        .route("/vms/:uuid", get(vm::vm_details))
        .route("/vms/:uuid/metrics", get(vm::vm_metrics))
        .route("/vms/:uuid/power", post(vm::power_vm))
        .route("/hosts", get(inventory::list_hosts))
        .route("/datastores", get(inventory::list_datastores))
        .route("/templates", get(inventory::list_templates))
        .route("/isos", get(inventory::list_isos));

    if server.enable_swagger_ui {
        router = router
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(Extension(state)),
    )
}
