//! Domain types crossing the service boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VesperError};
use crate::vim::types::ManagedObjectRef;

/// Declarative intent for one new VM. Mirrors the wire shape: the image
/// source arrives as loose fields and is narrowed to [`ImageSource`] by
/// [`ProvisioningRequest::source`], which is where the exactly-one-source
/// invariant is enforced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub name: String,
    pub template_id: Option<String>,
    pub boot_media_path: Option<String>,
    pub guest_os_id: Option<String>,
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub disk_gb: Option<u64>,
    pub datastore_name: Option<String>,
    pub network_name: Option<String>,
    pub power_on: bool,
}

/// Where the new VM's contents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Template {
        template_id: String,
    },
    BootMedia {
        boot_media_path: String,
        guest_os_id: String,
    },
}

impl ProvisioningRequest {
    /// Validate the request and narrow the source fields. Rejects before any
    /// remote call: empty name, non-positive sizing, both or neither source
    /// set, and boot-media installs without a guest OS id or datastore.
    pub fn source(&self) -> Result<ImageSource> {
        if self.name.trim().is_empty() {
            return Err(VesperError::validation("name", "must not be empty"));
        }
        if self.cpu_count == 0 {
            return Err(VesperError::validation("cpu_count", "must be positive"));
        }
        if self.memory_mb == 0 {
            return Err(VesperError::validation("memory_mb", "must be positive"));
        }
        if let Some(0) = self.disk_gb {
            return Err(VesperError::validation("disk_gb", "must be positive"));
        }

        match (&self.template_id, &self.boot_media_path) {
            (Some(_), Some(_)) => Err(VesperError::validation(
                "source",
                "template_id and boot_media_path are mutually exclusive",
            )),
            (None, None) => Err(VesperError::validation(
                "source",
                "either template_id or boot_media_path is required",
            )),
            (Some(template_id), None) => Ok(ImageSource::Template {
                template_id: template_id.clone(),
            }),
            (None, Some(boot_media_path)) => {
                let guest_os_id = match &self.guest_os_id {
                    Some(id) if !id.is_empty() => id.clone(),
                    _ => {
                        return Err(VesperError::validation(
                            "guest_os_id",
                            "required when installing from boot media",
                        ))
                    }
                };
                if self.datastore_name.is_none() {
                    return Err(VesperError::validation(
                        "datastore_name",
                        "required when installing from boot media",
                    ));
                }
                Ok(ImageSource::BootMedia {
                    boot_media_path: boot_media_path.clone(),
                    guest_os_id,
                })
            }
        }
    }
}

/// Result of a completed provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub vm: ManagedObjectRef,
    pub name: String,
    pub powered_on: bool,
}

/// Requested power transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    On,
    Off,
}

// --- read-through query views ----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmDetails {
    #[serde(flatten)]
    pub summary: VmSummary,
    pub host_name: Option<String>,
    pub annotation: String,
    pub moid: String,
    pub boot_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmMetrics {
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSummary {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub moid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    pub capacity_bytes: u64,
    pub free_space_bytes: u64,
    pub url: String,
    pub accessible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub uuid: String,
    pub name: String,
    pub guest_os: String,
    pub disk_capacity_bytes: i64,
    pub datastore_name: Option<String>,
}
