//! OpenAPI document assembly.

use utoipa::OpenApi;

use super::schemas::{
    ConnectRequest, ConnectResponse, CreateVmRequest, CreateVmResponse, DatastoreInfo,
    ErrorResponse, HealthResponse, HostInfo, OperationResponse, PowerRequest, TemplateInfo,
    VmDetailInfo, VmInfo, VmMetricsInfo,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vesper",
        description = "vSphere provisioning control plane",
    ),
    paths(
        crate::api::rest::connect::health,
        crate::api::rest::connect::test_connection,
        crate::api::rest::vm::list_vms,
        crate::api::rest::vm::vm_details,
        crate::api::rest::vm::vm_metrics,
        crate::api::rest::vm::power_vm,
        crate::api::rest::vm::create_vm,
        crate::api::rest::inventory::list_hosts,
        crate::api::rest::inventory::list_datastores,
        crate::api::rest::inventory::list_templates,
        crate::api::rest::inventory::list_isos,
    ),
    components(schemas(
        ConnectRequest,
        ConnectResponse,
        CreateVmRequest,
        CreateVmResponse,
        DatastoreInfo,
        ErrorResponse,
        HealthResponse,
        HostInfo,
        OperationResponse,
        PowerRequest,
        TemplateInfo,
        VmDetailInfo,
        VmInfo,
        VmMetricsInfo,
    )),
    tags(
        (name = "service", description = "Liveness and connection verification"),
        (name = "vm", description = "VM queries, power and provisioning"),
        (name = "inventory", description = "Hosts, datastores, templates, ISO images"),
    )
)]
pub struct ApiDoc;
