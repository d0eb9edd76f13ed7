//! Request/response DTOs for the REST API.
//!
//! These mirror the core view types but carry the OpenAPI schema derives;
//! conversions keep the wire shapes decoupled from the core model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use vesper_core::types;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    443
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub status: String,
    pub message: String,
    pub vsphere_subtype: String,
    pub api_version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            step: None,
            vm_id: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VmInfo {
    pub name: String,
    pub power_state: String,
    pub guest_os: String,
    pub ip_address: Option<String>,
    pub uuid: String,
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub disk_gb: f64,
    pub hostname: Option<String>,
    pub vmware_tools_status: String,
}

impl From<types::VmSummary> for VmInfo {
    fn from(summary: types::VmSummary) -> Self {
        Self {
            name: summary.name,
            power_state: summary.power_state,
            guest_os: summary.guest_os,
            ip_address: summary.ip_address,
            uuid: summary.uuid,
            cpu_count: summary.cpu_count,
            memory_mb: summary.memory_mb,
            disk_gb: summary.disk_gb,
            hostname: summary.hostname,
            vmware_tools_status: summary.vmware_tools_status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VmDetailInfo {
    #[serde(flatten)]
    #[schema(inline)]
    pub summary: VmInfo,
    pub host_name: Option<String>,
    pub annotation: String,
    pub moid: String,
    pub boot_time: Option<DateTime<Utc>>,
}

impl From<types::VmDetails> for VmDetailInfo {
    fn from(details: types::VmDetails) -> Self {
        Self {
            summary: details.summary.into(),
            host_name: details.host_name,
            annotation: details.annotation,
            moid: details.moid,
            boot_time: details.boot_time,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VmMetricsInfo {
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub uptime_seconds: u64,
}

impl From<types::VmMetrics> for VmMetricsInfo {
    fn from(metrics: types::VmMetrics) -> Self {
        Self {
            cpu_usage_percent: metrics.cpu_usage_percent,
            memory_usage_percent: metrics.memory_usage_percent,
            uptime_seconds: metrics.uptime_seconds,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HostInfo {
    pub moid: String,
    pub name: String,
    pub overall_status: String,
    pub connection_state: String,
    pub power_state: String,
    pub cpu_cores: u32,
    pub cpu_usage_percent: f64,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub vm_count: usize,
}

impl From<types::HostSummary> for HostInfo {
    fn from(host: types::HostSummary) -> Self {
        Self {
            moid: host.moid,
            name: host.name,
            overall_status: host.overall_status,
            connection_state: host.connection_state,
            power_state: host.power_state,
            cpu_cores: host.cpu_cores,
            cpu_usage_percent: host.cpu_usage_percent,
            memory_total_bytes: host.memory_total_bytes,
            memory_used_bytes: host.memory_used_bytes,
            vm_count: host.vm_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatastoreInfo {
    pub moid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    pub capacity_bytes: u64,
    pub free_space_bytes: u64,
    pub url: String,
    pub accessible: bool,
}

impl From<types::DatastoreSummary> for DatastoreInfo {
    fn from(datastore: types::DatastoreSummary) -> Self {
        Self {
            moid: datastore.moid,
            name: datastore.name,
            ds_type: datastore.ds_type,
            capacity_bytes: datastore.capacity_bytes,
            free_space_bytes: datastore.free_space_bytes,
            url: datastore.url,
            accessible: datastore.accessible,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateInfo {
    pub uuid: String,
    pub name: String,
    pub guest_os: String,
    pub disk_capacity_bytes: i64,
    pub datastore_name: Option<String>,
}

impl From<types::TemplateSummary> for TemplateInfo {
    fn from(template: types::TemplateSummary) -> Self {
        Self {
            uuid: template.uuid,
            name: template.name,
            guest_os: template.guest_os,
            disk_capacity_bytes: template.disk_capacity_bytes,
            datastore_name: template.datastore_name,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct IsoQuery {
    /// Datastore to search for ISO images
    pub datastore: Option<String>,
}

/// Power request body. The action is parsed by hand so an unknown action is
/// a 400, matching the rest of the validation behavior.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PowerRequest {
    /// "on" or "off"
    pub action: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OperationResponse {
    pub status: String,
}

impl OperationResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVmRequest {
    pub name: String,
    pub template_id: Option<String>,
    pub boot_media_path: Option<String>,
    pub guest_os_id: Option<String>,
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub disk_gb: Option<u64>,
    pub datastore_name: Option<String>,
    pub network_name: Option<String>,
    #[serde(default)]
    pub power_on: bool,
}

impl From<CreateVmRequest> for types::ProvisioningRequest {
    fn from(request: CreateVmRequest) -> Self {
        Self {
            name: request.name,
            template_id: request.template_id,
            boot_media_path: request.boot_media_path,
            guest_os_id: request.guest_os_id,
            cpu_count: request.cpu_count,
            memory_mb: request.memory_mb,
            disk_gb: request.disk_gb,
            datastore_name: request.datastore_name,
            network_name: request.network_name,
            power_on: request.power_on,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateVmResponse {
    pub status: String,
    pub vm_id: String,
    pub vm_name: String,
    pub powered_on: bool,
}

impl From<types::ProvisionOutcome> for CreateVmResponse {
    fn from(outcome: types::ProvisionOutcome) -> Self {
        Self {
            status: "success".to_string(),
            vm_id: outcome.vm.id,
            vm_name: outcome.name,
            powered_on: outcome.powered_on,
        }
    }
}
