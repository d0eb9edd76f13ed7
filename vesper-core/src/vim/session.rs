//! Collaborator traits for the hypervisor management endpoint.
//!
//! The core never speaks the wire protocol itself: orchestration, placement
//! and the task watcher are written against these traits, and the concrete
//! client (or the in-crate mock) supplies the transport. Implementations
//! must be `Send + Sync`; sessions are shared across concurrent request
//! tasks and the watcher's subscription loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::vim::types::{
    AboutInfo, CloneSpec, DatastoreRecord, FilterKey, HostRecord, ManagedObjectRef, NetworkObject,
    PowerState, TaskKey, TemplateRecord, UpdateBatch, VirtualMachineRecord, VmConfigSpec,
};

/// Opens sessions against a management endpoint.
///
/// Login failures surface as `VesperError::AuthenticationFailed` and are
/// never retried automatically.
#[async_trait]
pub trait VimConnector: Send + Sync {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn VimSession>>;
}

/// One authenticated session with the endpoint.
///
/// Inventory lookups are read-through (no caching here); task submissions
/// return the endpoint-assigned key immediately and completion is observed
/// through the update-stream methods, normally via the task watcher.
#[async_trait]
pub trait VimSession: Send + Sync {
    // --- session -----------------------------------------------------------

    async fn about(&self) -> Result<AboutInfo>;

    async fn logout(&self) -> Result<()>;

    // --- inventory ---------------------------------------------------------

    async fn list_virtual_machines(&self) -> Result<Vec<VirtualMachineRecord>>;

    /// Look a VM up by its BIOS UUID.
    async fn find_vm_by_uuid(&self, uuid: &str) -> Result<Option<VirtualMachineRecord>>;

    async fn list_hosts(&self) -> Result<Vec<HostRecord>>;

    async fn list_datastores(&self) -> Result<Vec<DatastoreRecord>>;

    async fn list_templates(&self) -> Result<Vec<TemplateRecord>>;

    /// Look a template up by UUID or display name.
    async fn find_template(&self, id_or_name: &str) -> Result<Option<TemplateRecord>>;

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreRecord>>;

    async fn find_network(&self, name: &str) -> Result<Option<NetworkObject>>;

    /// Default VM folder of the datacenter owning `obj`.
    async fn datacenter_vm_folder(&self, obj: &ManagedObjectRef) -> Result<ManagedObjectRef>;

    /// Root resource pool of the cluster or host owning `obj`.
    async fn default_resource_pool(&self, obj: &ManagedObjectRef) -> Result<ManagedObjectRef>;

    /// Current runtime power state of a VM.
    async fn vm_power_state(&self, vm: &ManagedObjectRef) -> Result<PowerState>;

    // --- task submission ---------------------------------------------------

    async fn clone_vm_task(
        &self,
        template: &ManagedObjectRef,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<TaskKey>;

    async fn create_vm_task(
        &self,
        folder: &ManagedObjectRef,
        resource_pool: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> Result<TaskKey>;

    async fn reconfigure_vm_task(
        &self,
        vm: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> Result<TaskKey>;

    async fn power_on_vm_task(&self, vm: &ManagedObjectRef) -> Result<TaskKey>;

    async fn power_off_vm_task(&self, vm: &ManagedObjectRef) -> Result<TaskKey>;

    /// Recursive datastore-browser search for files matching `pattern`.
    async fn search_datastore_task(
        &self,
        datastore: &ManagedObjectRef,
        pattern: &str,
    ) -> Result<TaskKey>;

    // --- update stream -----------------------------------------------------

    /// Register a server-side filter so updates for `task` appear on the
    /// stream. The returned key must be passed to `destroy_filter` once the
    /// task is resolved or abandoned; filters left behind leak watch state
    /// on the endpoint.
    async fn create_task_filter(&self, task: &TaskKey) -> Result<FilterKey>;

    async fn destroy_filter(&self, filter: &FilterKey) -> Result<()>;

    /// Block server-side until something tracked by a filter changes, at
    /// most `max_wait`. Returns `None` on a truncated (empty) wait. The
    /// returned batch carries the version to pass to the next call; an
    /// empty version string requests a full replay of current state.
    async fn wait_for_updates(&self, version: &str, max_wait: Duration)
        -> Result<Option<UpdateBatch>>;

    /// Unblock a concurrent `wait_for_updates` call, used at shutdown.
    async fn cancel_wait(&self) -> Result<()>;
}
