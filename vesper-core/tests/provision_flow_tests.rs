//! End-to-end orchestration tests over the mock endpoint.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vesper_core::config::{EndpointConfig, ProvisionConfig, WatcherConfig};
use vesper_core::provision::{ProvisionStep, Provisioner};
use vesper_core::task_watcher::TaskWatcher;
use vesper_core::types::ProvisioningRequest;
use vesper_core::vim::mock::{MockVimConnector, MockVimSession, TaskScript};
use vesper_core::vim::types::{
    BootDevice, DatastoreRecord, ManagedObjectRef, NetworkObject, PowerState, TaskResult,
    TemplateRecord, VirtualDevice,
};
use vesper_core::VesperError;

fn datastore(name: &str) -> DatastoreRecord {
    DatastoreRecord {
        moref: ManagedObjectRef::new("Datastore", format!("datastore-{}", name)),
        name: name.to_string(),
        ds_type: "VMFS".to_string(),
        capacity_bytes: 1 << 40,
        free_space_bytes: 1 << 39,
        url: format!("ds:///vmfs/volumes/{}/", name),
        accessible: true,
    }
}

fn template() -> TemplateRecord {
    TemplateRecord {
        moref: ManagedObjectRef::virtual_machine("vm-101"),
        name: "ubuntu-template".to_string(),
        uuid: "tpl-123".to_string(),
        guest_id: "ubuntu64Guest".to_string(),
        guest_full_name: "Ubuntu Linux (64-bit)".to_string(),
        disk_capacities_bytes: vec![16 << 30],
        parent: Some(ManagedObjectRef::new("Folder", "group-v10")),
        resource_pool: Some(ManagedObjectRef::new("ResourcePool", "resgroup-21")),
        datastores: vec![datastore("DS1")],
    }
}

fn standard_network() -> NetworkObject {
    NetworkObject::Standard {
        moref: ManagedObjectRef::new("Network", "network-7"),
        name: "VM Network".to_string(),
    }
}

fn template_request() -> ProvisioningRequest {
    ProvisioningRequest {
        name: "web01".to_string(),
        template_id: Some("tpl-123".to_string()),
        cpu_count: 2,
        memory_mb: 4096,
        power_on: true,
        ..Default::default()
    }
}

struct Harness {
    session: Arc<MockVimSession>,
    provisioner: Provisioner,
}

fn harness(task_timeout: Duration) -> Harness {
    let session = Arc::new(MockVimSession::new());
    session.add_network(standard_network());
    let connector = Arc::new(MockVimConnector::new(session.clone()));
    let watcher = Arc::new(TaskWatcher::new(
        connector,
        EndpointConfig::default(),
        WatcherConfig {
            task_timeout,
            max_wait: Duration::from_millis(50),
            retry_delay: Duration::from_millis(20),
        },
    ));
    Harness {
        session,
        provisioner: Provisioner::new(watcher, ProvisionConfig::default()),
    }
}

fn vm_object(id: &str) -> TaskScript {
    TaskScript::Succeed(Some(TaskResult::Object(ManagedObjectRef::virtual_machine(
        id,
    ))))
}

#[tokio::test]
async fn template_clone_sequences_clone_reconfigure_power_on() {
    let h = harness(Duration::from_secs(5));
    h.session.add_template(template());
    h.session.script_task("CloneVM_Task", vm_object("vm-200"));
    h.session
        .script_task("ReconfigVM_Task", TaskScript::Succeed(None));
    h.session
        .script_task("PowerOnVM_Task", TaskScript::Succeed(None));

    let outcome = h
        .provisioner
        .provision(h.session.as_ref(), &template_request())
        .await
        .unwrap();

    assert_eq!(outcome.vm.id, "vm-200");
    assert_eq!(outcome.name, "web01");
    assert!(outcome.powered_on);

    let operations: Vec<String> = h
        .session
        .submissions()
        .into_iter()
        .map(|s| s.operation)
        .collect();
    assert_eq!(
        operations,
        vec!["CloneVM_Task", "ReconfigVM_Task", "PowerOnVM_Task"]
    );

    // CPU and memory are applied by the reconfigure step.
    let specs = h.session.recorded_config_specs();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].num_cpus, Some(2));
    assert_eq!(specs[0].memory_mb, Some(4096));

    // The clone stays in the template's folder and pool, with no relocation
    // when the request names no datastore.
    let clone_specs = h.session.recorded_clone_specs();
    assert_eq!(clone_specs[0].folder.id, "group-v10");
    assert_eq!(clone_specs[0].resource_pool.id, "resgroup-21");
    assert_eq!(clone_specs[0].datastore, None);
    assert!(!clone_specs[0].power_on);
}

#[tokio::test]
async fn template_with_non_folder_parent_falls_back_to_datacenter_folder() {
    let h = harness(Duration::from_secs(5));
    let mut tpl = template();
    tpl.parent = Some(ManagedObjectRef::new("HostSystem", "host-9"));
    tpl.resource_pool = None;
    h.session.add_template(tpl);
    h.session.script_task("CloneVM_Task", vm_object("vm-200"));
    h.session
        .script_task("ReconfigVM_Task", TaskScript::Succeed(None));
    h.session
        .script_task("PowerOnVM_Task", TaskScript::Succeed(None));

    h.provisioner
        .provision(h.session.as_ref(), &template_request())
        .await
        .unwrap();

    let clone_specs = h.session.recorded_clone_specs();
    // Mock datacenter defaults.
    assert_eq!(clone_specs[0].folder.id, "group-v3");
    assert_eq!(clone_specs[0].resource_pool.id, "resgroup-8");
}

#[tokio::test]
async fn power_on_is_skipped_when_vm_already_running() {
    let h = harness(Duration::from_secs(5));
    h.session.add_template(template());
    h.session.script_task("CloneVM_Task", vm_object("vm-200"));
    h.session
        .script_task("ReconfigVM_Task", TaskScript::Succeed(None));
    h.session
        .set_power_state(&ManagedObjectRef::virtual_machine("vm-200"), PowerState::PoweredOn);

    let outcome = h
        .provisioner
        .provision(h.session.as_ref(), &template_request())
        .await
        .unwrap();

    assert!(outcome.powered_on);
    assert!(
        h.session.submissions_of("PowerOnVM_Task").is_empty(),
        "power-on must be a local no-op for a running VM"
    );
}

#[tokio::test]
async fn both_sources_fail_validation_before_any_remote_call() {
    let h = harness(Duration::from_secs(5));
    let mut request = template_request();
    request.boot_media_path = Some("[ISOs] ubuntu.iso".to_string());
    request.guest_os_id = Some("ubuntu64Guest".to_string());

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &request)
        .await
        .unwrap_err();

    assert_eq!(failure.step, ProvisionStep::Validate);
    assert!(failure.vm.is_none());
    assert!(matches!(failure.source, VesperError::Validation { .. }));
    assert!(h.session.submissions().is_empty());
}

#[tokio::test]
async fn boot_media_without_datastore_fails_validation() {
    let h = harness(Duration::from_secs(5));
    let request = ProvisioningRequest {
        name: "iso01".to_string(),
        boot_media_path: Some("[ISOs] ubuntu.iso".to_string()),
        guest_os_id: Some("ubuntu64Guest".to_string()),
        cpu_count: 1,
        memory_mb: 2048,
        ..Default::default()
    };

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &request)
        .await
        .unwrap_err();

    assert_eq!(failure.step, ProvisionStep::Validate);
    match failure.source {
        VesperError::Validation { field, .. } => assert_eq!(field, "datastore_name"),
        other => panic!("expected validation error, got {}", other),
    }
    assert!(h.session.submissions().is_empty());
}

#[tokio::test]
async fn clone_failure_surfaces_without_a_vm_reference() {
    let h = harness(Duration::from_secs(5));
    h.session.add_template(template());
    h.session.script_task(
        "CloneVM_Task",
        TaskScript::Fail("The operation is not allowed in the current state.".to_string()),
    );

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &template_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ProvisionStep::Submit);
    assert!(failure.vm.is_none(), "no VM was created");
    match &failure.source {
        VesperError::RemoteTask { message, .. } => {
            assert_eq!(message, "The operation is not allowed in the current state.");
        }
        other => panic!("expected remote task error, got {}", other),
    }
    assert!(h.session.submissions_of("ReconfigVM_Task").is_empty());
}

#[tokio::test]
async fn reconfigure_timeout_reports_the_partially_created_vm() {
    let h = harness(Duration::from_millis(150));
    h.session.add_template(template());
    h.session.script_task("CloneVM_Task", vm_object("vm-200"));
    h.session.script_task("ReconfigVM_Task", TaskScript::Hang);

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &template_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ProvisionStep::Reconfigure);
    assert_eq!(
        failure.vm.as_ref().map(|vm| vm.id.as_str()),
        Some("vm-200"),
        "the caller must learn a VM now exists"
    );
    assert!(matches!(failure.source, VesperError::Timeout { .. }));
    // Nothing attempts a cleanup delete.
    assert!(h.session.submissions_of("PowerOffVM_Task").is_empty());
}

#[tokio::test]
async fn missing_template_fails_placement_closed() {
    let h = harness(Duration::from_secs(5));

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &template_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ProvisionStep::Placement);
    assert!(matches!(failure.source, VesperError::NotFound { .. }));
    assert!(h.session.submissions().is_empty());
}

#[tokio::test]
async fn explicit_datastore_must_exist_and_be_accessible() {
    let h = harness(Duration::from_secs(5));
    h.session.add_template(template());
    let mut request = template_request();
    request.datastore_name = Some("DS-missing".to_string());

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &request)
        .await
        .unwrap_err();
    assert_eq!(failure.step, ProvisionStep::Placement);
    assert!(h.session.submissions().is_empty());

    // Present but inaccessible is just as much of a placement failure.
    let mut broken = datastore("DS-broken");
    broken.accessible = false;
    h.session.add_datastore(broken);
    let mut request = template_request();
    request.datastore_name = Some("DS-broken".to_string());

    let failure = h
        .provisioner
        .provision(h.session.as_ref(), &request)
        .await
        .unwrap_err();
    assert_eq!(failure.step, ProvisionStep::Placement);
    assert!(matches!(failure.source, VesperError::NotFound { .. }));
    assert!(h.session.submissions().is_empty());
}

#[tokio::test]
async fn unknown_network_fails_placement_closed() {
    let session = Arc::new(MockVimSession::new());
    session.add_template(template());
    let connector = Arc::new(MockVimConnector::new(session.clone()));
    let watcher = Arc::new(TaskWatcher::new(
        connector,
        EndpointConfig::default(),
        WatcherConfig::default(),
    ));
    let provisioner = Provisioner::new(watcher, ProvisionConfig::default());

    let failure = provisioner
        .provision(session.as_ref(), &template_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ProvisionStep::Placement);
    match failure.source {
        VesperError::NotFound { resource } => assert!(resource.contains("VM Network")),
        other => panic!("expected not-found, got {}", other),
    }
    assert!(session.submissions().is_empty());
}

#[tokio::test]
async fn boot_media_create_builds_topology_and_reconfigures() {
    let h = harness(Duration::from_secs(5));
    h.session.add_datastore(datastore("DS1"));
    h.session.script_task("CreateVM_Task", vm_object("vm-300"));
    h.session
        .script_task("ReconfigVM_Task", TaskScript::Succeed(None));

    let request = ProvisioningRequest {
        name: "iso01".to_string(),
        boot_media_path: Some("[ISOs] ubuntu-24.04.iso".to_string()),
        guest_os_id: Some("ubuntu64Guest".to_string()),
        datastore_name: Some("DS1".to_string()),
        cpu_count: 4,
        memory_mb: 8192,
        ..Default::default()
    };

    let outcome = h
        .provisioner
        .provision(h.session.as_ref(), &request)
        .await
        .unwrap();

    assert_eq!(outcome.vm.id, "vm-300");
    assert!(!outcome.powered_on);

    let operations: Vec<String> = h
        .session
        .submissions()
        .into_iter()
        .map(|s| s.operation)
        .collect();
    assert_eq!(operations, vec!["CreateVM_Task", "ReconfigVM_Task"]);

    let specs = h.session.recorded_config_specs();
    let create_spec = &specs[0];
    assert_eq!(create_spec.name.as_deref(), Some("iso01"));
    assert_eq!(create_spec.guest_id.as_deref(), Some("ubuntu64Guest"));
    assert_eq!(
        create_spec.files_datastore_path.as_deref(),
        Some("[DS1] iso01")
    );
    // Controller first; disk defaults to the configured minimum size.
    assert!(matches!(
        create_spec.device_changes[0].device,
        VirtualDevice::ScsiController { .. }
    ));
    let disk_kb = create_spec
        .device_changes
        .iter()
        .find_map(|c| match c.device {
            VirtualDevice::Disk { capacity_kb, .. } => Some(capacity_kb),
            _ => None,
        })
        .unwrap();
    assert_eq!(disk_kb, 10 * 1024 * 1024);
    assert_eq!(create_spec.boot_order[0], BootDevice::Cdrom);

    // The create spec carries no sizing; the reconfigure step does.
    assert_eq!(create_spec.num_cpus, None);
    let reconfigure_spec = &specs[1];
    assert_eq!(reconfigure_spec.num_cpus, Some(4));
    assert_eq!(reconfigure_spec.memory_mb, Some(8192));
}
