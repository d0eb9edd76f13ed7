//! Data model for the objects exchanged with the management endpoint.
//!
//! Managed object references are kept as (kind, id) string pairs rather than
//! a closed enum: the endpoint's inventory contains object kinds this service
//! never touches, and an unknown kind in a reference must round-trip intact.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle to an object living on the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    pub kind: String,
    pub id: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn virtual_machine(id: impl Into<String>) -> Self {
        Self::new("VirtualMachine", id)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == "Folder"
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Server-assigned key of an in-flight task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned key of a property filter on the update stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterKey(String);

impl FilterKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime power state of a VM, in the endpoint's own spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// State of a server-side task. Queued and Running are intermediate;
/// Success and Error are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

/// Value produced by a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskResult {
    /// A reference to the object the task produced (e.g. the cloned VM).
    Object(ManagedObjectRef),
    /// Files found by a datastore-browser search.
    Files(Vec<DatastoreFile>),
}

impl TaskResult {
    pub fn as_object(&self) -> Option<&ManagedObjectRef> {
        match self {
            TaskResult::Object(moref) => Some(moref),
            _ => None,
        }
    }
}

/// One observed change to a tracked task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task: TaskKey,
    pub state: TaskState,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One batch of changes returned by a wait-for-updates call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBatch {
    /// Stream position to pass to the next wait call.
    pub version: String,
    pub updates: Vec<TaskUpdate>,
}

/// Endpoint identity, used to classify vCenter vs standalone ESXi.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AboutInfo {
    pub full_name: String,
    pub api_type: String,
    pub api_version: String,
}

impl AboutInfo {
    pub fn subtype(&self) -> &'static str {
        if self.api_type == "VirtualCenter" {
            "vcenter"
        } else {
            "esxi"
        }
    }
}

/// Quick-stats counters carried on a VM summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickStats {
    pub overall_cpu_usage_mhz: Option<u32>,
    pub guest_memory_usage_mb: Option<u32>,
    pub uptime_seconds: Option<u64>,
}

/// Inventory record for a VM, shared by list and details queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachineRecord {
    pub moref: ManagedObjectRef,
    pub name: String,
    pub uuid: String,
    pub power_state: PowerState,
    pub guest_full_name: String,
    pub num_cpu: u32,
    pub memory_mb: u64,
    /// Capacity of each virtual disk in KB, endpoint order.
    pub disk_capacities_kb: Vec<i64>,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub tools_status: Option<String>,
    pub host_name: Option<String>,
    pub annotation: String,
    pub boot_time: Option<DateTime<Utc>>,
    pub quick_stats: QuickStats,
    pub is_template: bool,
}

/// Inventory record for a hypervisor host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub moref: ManagedObjectRef,
    pub name: String,
    pub overall_status: String,
    pub connection_state: String,
    pub power_state: String,
    pub num_cpu_cores: u32,
    pub cpu_mhz_per_core: u32,
    pub cpu_usage_mhz: u32,
    pub memory_total_bytes: u64,
    pub memory_usage_mb: u64,
    pub vm_count: usize,
}

/// Inventory record for a datastore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreRecord {
    pub moref: ManagedObjectRef,
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    pub capacity_bytes: u64,
    pub free_space_bytes: u64,
    pub url: String,
    pub accessible: bool,
}

/// Inventory record for a VM template, carrying what placement needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub moref: ManagedObjectRef,
    pub name: String,
    pub uuid: String,
    pub guest_id: String,
    pub guest_full_name: String,
    /// Capacity of each virtual disk in bytes, endpoint order.
    pub disk_capacities_bytes: Vec<i64>,
    /// Immediate inventory parent; not necessarily folder-typed.
    pub parent: Option<ManagedObjectRef>,
    pub resource_pool: Option<ManagedObjectRef>,
    /// Datastores backing the template, primary first.
    pub datastores: Vec<DatastoreRecord>,
}

/// One file found by a datastore-browser search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreFile {
    /// Full datastore path, e.g. `[ISOs] ubuntu/ubuntu-24.04.iso`.
    pub path: String,
    pub size_bytes: u64,
}

/// A network a VM NIC can attach to. Standard networks and distributed
/// portgroups produce structurally different device backings, so the variant
/// is decided once at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkObject {
    Standard {
        moref: ManagedObjectRef,
        name: String,
    },
    DistributedPortgroup {
        moref: ManagedObjectRef,
        name: String,
        portgroup_key: String,
        switch_uuid: String,
    },
}

impl NetworkObject {
    pub fn name(&self) -> &str {
        match self {
            NetworkObject::Standard { name, .. } => name,
            NetworkObject::DistributedPortgroup { name, .. } => name,
        }
    }

    pub fn moref(&self) -> &ManagedObjectRef {
        match self {
            NetworkObject::Standard { moref, .. } => moref,
            NetworkObject::DistributedPortgroup { moref, .. } => moref,
        }
    }
}

// --- device model -----------------------------------------------------------

/// How a NIC attaches to its network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkBacking {
    Standard {
        network: ManagedObjectRef,
        device_name: String,
    },
    DistributedPort {
        portgroup_key: String,
        switch_uuid: String,
    },
}

/// Virtual hardware the topology builder emits. Keys are placeholders,
/// unique and negative within one submission; the endpoint assigns the
/// real keys on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VirtualDevice {
    ScsiController {
        key: i32,
        bus_number: u32,
    },
    Disk {
        key: i32,
        controller_key: i32,
        unit_number: i32,
        capacity_kb: i64,
        thin_provisioned: bool,
        /// Datastore path of the backing file, e.g. `[DS1] web01/web01.vmdk`.
        file_path: String,
    },
    Cdrom {
        key: i32,
        controller_key: i32,
        /// Datastore path of the ISO image.
        iso_path: String,
        start_connected: bool,
    },
    /// vmxnet3 network adapter.
    EthernetAdapter {
        key: i32,
        backing: NetworkBacking,
        start_connected: bool,
    },
}

impl VirtualDevice {
    pub fn key(&self) -> i32 {
        match self {
            VirtualDevice::ScsiController { key, .. }
            | VirtualDevice::Disk { key, .. }
            | VirtualDevice::Cdrom { key, .. }
            | VirtualDevice::EthernetAdapter { key, .. } => *key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOperation {
    Add,
    Edit,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Replace,
    Destroy,
}

/// One entry in the ordered device-change list of a config spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChange {
    pub operation: DeviceOperation,
    pub file_operation: Option<FileOperation>,
    pub device: VirtualDevice,
}

/// Boot-order entry. The optical drive carries no key; disks boot by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BootDevice {
    Cdrom,
    Disk { device_key: i32 },
}

/// Configuration spec for create and reconfigure submissions. Every field
/// is optional so a reconfigure can touch only what it means to change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfigSpec {
    pub name: Option<String>,
    pub guest_id: Option<String>,
    pub num_cpus: Option<u32>,
    pub memory_mb: Option<u64>,
    pub annotation: Option<String>,
    /// Datastore directory for the VM's files, e.g. `[DS1] web01`.
    pub files_datastore_path: Option<String>,
    pub device_changes: Vec<DeviceChange>,
    pub boot_order: Vec<BootDevice>,
}

/// Spec for cloning a template into a new VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneSpec {
    pub folder: ManagedObjectRef,
    pub resource_pool: ManagedObjectRef,
    /// Relocation target; None inherits the template's datastore.
    pub datastore: Option<ManagedObjectRef>,
    pub power_on: bool,
    pub template: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_terminality() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Error.is_terminal());
    }

    #[test]
    fn about_info_subtype_classification() {
        let vcenter = AboutInfo {
            full_name: "VMware vCenter Server 8.0.1".to_string(),
            api_type: "VirtualCenter".to_string(),
            api_version: "8.0.1.0".to_string(),
        };
        assert_eq!(vcenter.subtype(), "vcenter");

        let esxi = AboutInfo {
            full_name: "VMware ESXi 8.0.1".to_string(),
            api_type: "HostAgent".to_string(),
            api_version: "8.0.1.0".to_string(),
        };
        assert_eq!(esxi.subtype(), "esxi");
    }

    #[test]
    fn power_state_uses_endpoint_spelling() {
        let json = serde_json::to_string(&PowerState::PoweredOn).unwrap();
        assert_eq!(json, "\"poweredOn\"");
        let state: TaskState = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(state, TaskState::Success);
    }
}
