//! The provisioning orchestrator.
//!
//! Sequences placement resolution, topology construction and the
//! clone/create → reconfigure → power-on task chain into one logical
//! transaction. Steps are strictly sequential: nothing is submitted before
//! the previous task's watcher wait returns success.
//!
//! Failure after the first successful mutating step leaves a partially
//! configured VM on the endpoint. That VM is deliberately NOT deleted here;
//! the failure carries the step and the VM reference so the operator can
//! recover or remove it. Automatic rollback could destroy a machine that is
//! still salvageable.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::ProvisionConfig;
use crate::devices::{build_topology, vm_directory_path};
use crate::error::{Result, VesperError};
use crate::placement::{PlacementResolver, PlacementResult};
use crate::task_watcher::TaskWatcher;
use crate::types::{ImageSource, ProvisionOutcome, ProvisioningRequest};
use crate::vim::session::VimSession;
use crate::vim::types::{
    CloneSpec, ManagedObjectRef, PowerState, TaskKey, TaskResult, VmConfigSpec,
};

/// Where in the orchestration a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Validate,
    Placement,
    Submit,
    Reconfigure,
    PowerOn,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStep::Validate => "validation",
            ProvisionStep::Placement => "placement",
            ProvisionStep::Submit => "submit",
            ProvisionStep::Reconfigure => "reconfigure",
            ProvisionStep::PowerOn => "power-on",
        };
        f.write_str(s)
    }
}

/// A failed provisioning run. `vm` is populated from the first successful
/// mutating step onward, telling the caller a partially configured VM now
/// exists on the endpoint.
#[derive(Debug, Error)]
#[error("provisioning failed during {step}: {source}")]
pub struct ProvisionFailure {
    pub step: ProvisionStep,
    pub vm: Option<ManagedObjectRef>,
    #[source]
    pub source: VesperError,
}

/// The ordered steps derived from one request. Ephemeral: lives only for
/// the duration of a single orchestration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    Clone,
    Create,
    Reconfigure,
    PowerOn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningPlan {
    pub steps: Vec<PlanStep>,
}

impl ProvisioningPlan {
    pub fn derive(source: &ImageSource, power_on: bool) -> Self {
        let mut steps = vec![match source {
            ImageSource::Template { .. } => PlanStep::Clone,
            ImageSource::BootMedia { .. } => PlanStep::Create,
        }];
        steps.push(PlanStep::Reconfigure);
        if power_on {
            steps.push(PlanStep::PowerOn);
        }
        Self { steps }
    }
}

pub struct Provisioner {
    watcher: Arc<TaskWatcher>,
    config: ProvisionConfig,
}

impl Provisioner {
    pub fn new(watcher: Arc<TaskWatcher>, config: ProvisionConfig) -> Self {
        Self { watcher, config }
    }

    /// Run one provisioning request to completion.
    pub async fn provision(
        &self,
        session: &dyn VimSession,
        request: &ProvisioningRequest,
    ) -> std::result::Result<ProvisionOutcome, ProvisionFailure> {
        let request_id = Uuid::new_v4();

        let source = request
            .source()
            .map_err(|e| fail(ProvisionStep::Validate, None, e))?;

        let placement = PlacementResolver::new(session, &self.config)
            .resolve(request, &source)
            .await
            .map_err(|e| fail(ProvisionStep::Placement, None, e))?;

        let plan = ProvisioningPlan::derive(&source, request.power_on);
        info!(
            "provisioning '{}' ({}): {} steps, datastore '{}', network '{}'",
            request.name,
            request_id,
            plan.steps.len(),
            placement.datastore.name,
            placement.network.name()
        );

        let mut vm: Option<ManagedObjectRef> = None;
        let mut powered_on = false;

        for step in &plan.steps {
            match step {
                PlanStep::Clone => {
                    vm = Some(self.run_clone(session, request, &placement).await?);
                }
                PlanStep::Create => {
                    vm = Some(self.run_create(session, request, &source, &placement).await?);
                }
                PlanStep::Reconfigure => {
                    let target = require_vm(&vm, ProvisionStep::Reconfigure)?;
                    self.run_reconfigure(session, request, &vm, target).await?;
                }
                PlanStep::PowerOn => {
                    let target = require_vm(&vm, ProvisionStep::PowerOn)?;
                    self.run_power_on(session, &vm, target).await?;
                    powered_on = true;
                }
            }
        }

        let vm = require_vm(&vm, ProvisionStep::Submit)?;
        info!(
            "provisioned '{}' ({}) as {}",
            request.name, request_id, vm
        );
        Ok(ProvisionOutcome {
            vm: vm.clone(),
            name: request.name.clone(),
            powered_on,
        })
    }

    async fn run_clone(
        &self,
        session: &dyn VimSession,
        request: &ProvisioningRequest,
        placement: &PlacementResult,
    ) -> std::result::Result<ManagedObjectRef, ProvisionFailure> {
        let template = placement
            .template
            .as_ref()
            .ok_or_else(|| {
                fail(
                    ProvisionStep::Submit,
                    None,
                    VesperError::internal("template placement missing on clone path"),
                )
            })?;

        let spec = CloneSpec {
            folder: placement.folder.clone(),
            resource_pool: placement.resource_pool.clone(),
            // Only relocate when the caller named a datastore; otherwise the
            // clone stays with the template's files.
            datastore: request
                .datastore_name
                .as_ref()
                .map(|_| placement.datastore.moref.clone()),
            power_on: false,
            template: false,
        };

        let key = session
            .clone_vm_task(&template.moref, &request.name, &spec)
            .await
            .map_err(|e| fail(ProvisionStep::Submit, None, e))?;
        let result = self
            .await_task(key, "CloneVM_Task")
            .await
            .map_err(|e| fail(ProvisionStep::Submit, None, e))?;
        object_result(result, "CloneVM_Task")
            .map_err(|e| fail(ProvisionStep::Submit, None, e))
    }

    async fn run_create(
        &self,
        session: &dyn VimSession,
        request: &ProvisioningRequest,
        source: &ImageSource,
        placement: &PlacementResult,
    ) -> std::result::Result<ManagedObjectRef, ProvisionFailure> {
        let (boot_media_path, guest_os_id) = match source {
            ImageSource::BootMedia {
                boot_media_path,
                guest_os_id,
            } => (boot_media_path, guest_os_id),
            ImageSource::Template { .. } => {
                return Err(fail(
                    ProvisionStep::Submit,
                    None,
                    VesperError::internal("create step reached on template path"),
                ))
            }
        };

        let disk_gb = request
            .disk_gb
            .unwrap_or(self.config.min_boot_media_disk_gb);
        let topology = build_topology(
            &request.name,
            disk_gb,
            boot_media_path,
            &placement.datastore,
            &placement.network,
        );

        let spec = VmConfigSpec {
            name: Some(request.name.clone()),
            guest_id: Some(guest_os_id.clone()),
            files_datastore_path: Some(vm_directory_path(
                &placement.datastore.name,
                &request.name,
            )),
            device_changes: topology.changes,
            boot_order: topology.boot_order,
            ..Default::default()
        };

        let key = session
            .create_vm_task(&placement.folder, &placement.resource_pool, &spec)
            .await
            .map_err(|e| fail(ProvisionStep::Submit, None, e))?;
        let result = self
            .await_task(key, "CreateVM_Task")
            .await
            .map_err(|e| fail(ProvisionStep::Submit, None, e))?;
        object_result(result, "CreateVM_Task")
            .map_err(|e| fail(ProvisionStep::Submit, None, e))
    }

    async fn run_reconfigure(
        &self,
        session: &dyn VimSession,
        request: &ProvisioningRequest,
        vm: &Option<ManagedObjectRef>,
        target: &ManagedObjectRef,
    ) -> std::result::Result<(), ProvisionFailure> {
        let spec = VmConfigSpec {
            num_cpus: Some(request.cpu_count),
            memory_mb: Some(request.memory_mb),
            ..Default::default()
        };
        let key = session
            .reconfigure_vm_task(target, &spec)
            .await
            .map_err(|e| fail(ProvisionStep::Reconfigure, vm.as_ref(), e))?;
        self.await_task(key, "ReconfigVM_Task")
            .await
            .map_err(|e| fail(ProvisionStep::Reconfigure, vm.as_ref(), e))?;
        Ok(())
    }

    async fn run_power_on(
        &self,
        session: &dyn VimSession,
        vm: &Option<ManagedObjectRef>,
        target: &ManagedObjectRef,
    ) -> std::result::Result<(), ProvisionFailure> {
        let state = session
            .vm_power_state(target)
            .await
            .map_err(|e| fail(ProvisionStep::PowerOn, vm.as_ref(), e))?;
        // Some endpoints reject powering on a running VM; skip instead.
        if state == PowerState::PoweredOn {
            info!("{} already powered on; skipping power-on step", target);
            return Ok(());
        }
        let key = session
            .power_on_vm_task(target)
            .await
            .map_err(|e| fail(ProvisionStep::PowerOn, vm.as_ref(), e))?;
        self.await_task(key, "PowerOnVM_Task")
            .await
            .map_err(|e| fail(ProvisionStep::PowerOn, vm.as_ref(), e))?;
        Ok(())
    }

    async fn await_task(&self, key: TaskKey, operation: &str) -> Result<Option<TaskResult>> {
        let deadline = self.watcher.task_timeout();
        let handle = self.watcher.submit(key).await?;
        let outcome = self.watcher.wait(handle).await?;
        outcome.into_result(operation, deadline)
    }
}

fn fail(
    step: ProvisionStep,
    vm: Option<&ManagedObjectRef>,
    source: VesperError,
) -> ProvisionFailure {
    ProvisionFailure {
        step,
        vm: vm.cloned(),
        source,
    }
}

fn require_vm<'a>(
    vm: &'a Option<ManagedObjectRef>,
    step: ProvisionStep,
) -> std::result::Result<&'a ManagedObjectRef, ProvisionFailure> {
    vm.as_ref().ok_or_else(|| {
        fail(
            step,
            None,
            VesperError::internal("no VM reference from the submit step"),
        )
    })
}

fn object_result(result: Option<TaskResult>, operation: &str) -> Result<ManagedObjectRef> {
    match result {
        Some(TaskResult::Object(moref)) => Ok(moref),
        _ => Err(VesperError::internal(format!(
            "{} completed without a VM reference",
            operation
        ))),
    }
}
