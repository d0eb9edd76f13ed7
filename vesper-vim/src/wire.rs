//! Mapping between the core model and the VI/JSON payload shapes.
//!
//! The protocol tags polymorphic objects with `_typeName` and encodes
//! managed object references as `{type, value}` pairs. Everything here is
//! pure data shuffling so it stays unit-testable without a transport.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use vesper_core::vim::types::{
    BootDevice, CloneSpec, DatastoreFile, DatastoreRecord, DeviceChange, DeviceOperation,
    FileOperation, HostRecord, ManagedObjectRef, NetworkBacking, PowerState, QuickStats,
    TaskResult, TaskState, TaskUpdate, TemplateRecord, UpdateBatch, VirtualDevice,
    VirtualMachineRecord, VmConfigSpec,
};

// --- encoding ---------------------------------------------------------------

pub fn moref_value(moref: &ManagedObjectRef) -> Value {
    json!({
        "_typeName": "ManagedObjectReference",
        "type": moref.kind,
        "value": moref.id,
    })
}

pub fn clone_body(folder: &ManagedObjectRef, name: &str, spec: &CloneSpec) -> Value {
    let mut location = json!({
        "_typeName": "VirtualMachineRelocateSpec",
        "pool": moref_value(&spec.resource_pool),
    });
    if let Some(datastore) = &spec.datastore {
        location["datastore"] = moref_value(datastore);
    }
    json!({
        "folder": moref_value(folder),
        "name": name,
        "spec": {
            "_typeName": "VirtualMachineCloneSpec",
            "location": location,
            "powerOn": spec.power_on,
            "template": spec.template,
        },
    })
}

pub fn config_spec_value(spec: &VmConfigSpec) -> Value {
    let mut body = json!({ "_typeName": "VirtualMachineConfigSpec" });
    if let Some(name) = &spec.name {
        body["name"] = json!(name);
    }
    if let Some(guest_id) = &spec.guest_id {
        body["guestId"] = json!(guest_id);
    }
    if let Some(num_cpus) = spec.num_cpus {
        body["numCPUs"] = json!(num_cpus);
    }
    if let Some(memory_mb) = spec.memory_mb {
        body["memoryMB"] = json!(memory_mb);
    }
    if let Some(annotation) = &spec.annotation {
        body["annotation"] = json!(annotation);
    }
    if let Some(path) = &spec.files_datastore_path {
        body["files"] = json!({
            "_typeName": "VirtualMachineFileInfo",
            "vmPathName": path,
        });
    }
    if !spec.device_changes.is_empty() {
        let changes: Vec<Value> = spec.device_changes.iter().map(device_change_value).collect();
        body["deviceChange"] = Value::Array(changes);
    }
    if !spec.boot_order.is_empty() {
        let order: Vec<Value> = spec.boot_order.iter().map(boot_device_value).collect();
        body["bootOptions"] = json!({
            "_typeName": "VirtualMachineBootOptions",
            "bootOrder": order,
        });
    }
    body
}

fn device_change_value(change: &DeviceChange) -> Value {
    let mut body = json!({
        "_typeName": "VirtualDeviceConfigSpec",
        "operation": operation_name(change.operation),
        "device": device_value(&change.device),
    });
    if let Some(file_operation) = change.file_operation {
        body["fileOperation"] = json!(file_operation_name(file_operation));
    }
    body
}

fn operation_name(operation: DeviceOperation) -> &'static str {
    match operation {
        DeviceOperation::Add => "add",
        DeviceOperation::Edit => "edit",
        DeviceOperation::Remove => "remove",
    }
}

fn file_operation_name(operation: FileOperation) -> &'static str {
    match operation {
        FileOperation::Create => "create",
        FileOperation::Replace => "replace",
        FileOperation::Destroy => "destroy",
    }
}

fn device_value(device: &VirtualDevice) -> Value {
    match device {
        VirtualDevice::ScsiController { key, bus_number } => json!({
            "_typeName": "VirtualLsiLogicController",
            "key": key,
            "busNumber": bus_number,
            "sharedBus": "noSharing",
        }),
        VirtualDevice::Disk {
            key,
            controller_key,
            unit_number,
            capacity_kb,
            thin_provisioned,
            file_path,
        } => json!({
            "_typeName": "VirtualDisk",
            "key": key,
            "controllerKey": controller_key,
            "unitNumber": unit_number,
            "capacityInKB": capacity_kb,
            "backing": {
                "_typeName": "VirtualDiskFlatVer2BackingInfo",
                "fileName": file_path,
                "diskMode": "persistent",
                "thinProvisioned": thin_provisioned,
            },
        }),
        VirtualDevice::Cdrom {
            key,
            controller_key,
            iso_path,
            start_connected,
        } => json!({
            "_typeName": "VirtualCdrom",
            "key": key,
            "controllerKey": controller_key,
            "backing": {
                "_typeName": "VirtualCdromIsoBackingInfo",
                "fileName": iso_path,
            },
            "connectable": {
                "_typeName": "VirtualDeviceConnectInfo",
                "startConnected": start_connected,
                "connected": false,
                "allowGuestControl": true,
            },
        }),
        VirtualDevice::EthernetAdapter {
            key,
            backing,
            start_connected,
        } => json!({
            "_typeName": "VirtualVmxnet3",
            "key": key,
            "backing": backing_value(backing),
            "connectable": {
                "_typeName": "VirtualDeviceConnectInfo",
                "startConnected": start_connected,
                "connected": false,
                "allowGuestControl": true,
            },
        }),
    }
}

fn backing_value(backing: &NetworkBacking) -> Value {
    match backing {
        NetworkBacking::Standard {
            network,
            device_name,
        } => json!({
            "_typeName": "VirtualEthernetCardNetworkBackingInfo",
            "deviceName": device_name,
            "network": moref_value(network),
        }),
        NetworkBacking::DistributedPort {
            portgroup_key,
            switch_uuid,
        } => json!({
            "_typeName": "VirtualEthernetCardDistributedVirtualPortBackingInfo",
            "port": {
                "_typeName": "DistributedVirtualSwitchPortConnection",
                "portgroupKey": portgroup_key,
                "switchUuid": switch_uuid,
            },
        }),
    }
}

fn boot_device_value(device: &BootDevice) -> Value {
    match device {
        BootDevice::Cdrom => json!({
            "_typeName": "VirtualMachineBootOptionsBootableCdromDevice",
        }),
        BootDevice::Disk { device_key } => json!({
            "_typeName": "VirtualMachineBootOptionsBootableDiskDevice",
            "deviceKey": device_key,
        }),
    }
}

// --- decoding ---------------------------------------------------------------

pub fn moref_from_value(value: &Value) -> Option<ManagedObjectRef> {
    Some(ManagedObjectRef::new(
        value.get("type")?.as_str()?,
        value.get("value")?.as_str()?,
    ))
}

/// Parse the `objects` array of a RetrievePropertiesEx response into
/// (reference, property-name → value) pairs.
pub fn object_contents(response: &Value) -> Vec<(ManagedObjectRef, HashMap<String, Value>)> {
    let Some(objects) = response.get("objects").and_then(Value::as_array) else {
        return Vec::new();
    };
    objects
        .iter()
        .filter_map(|object| {
            let moref = moref_from_value(object.get("obj")?)?;
            let mut props = HashMap::new();
            if let Some(prop_set) = object.get("propSet").and_then(Value::as_array) {
                for prop in prop_set {
                    if let (Some(name), Some(val)) =
                        (prop.get("name").and_then(Value::as_str), prop.get("val"))
                    {
                        props.insert(name.to_string(), val.clone());
                    }
                }
            }
            Some((moref, props))
        })
        .collect()
}

fn path<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

fn str_at(value: &Value, segments: &[&str]) -> Option<String> {
    path(value, segments)?.as_str().map(str::to_string)
}

fn u64_at(value: &Value, segments: &[&str]) -> Option<u64> {
    path(value, segments)?.as_u64()
}

fn power_state_from(value: &Value) -> PowerState {
    match value.as_str() {
        Some("poweredOn") => PowerState::PoweredOn,
        Some("suspended") => PowerState::Suspended,
        _ => PowerState::PoweredOff,
    }
}

/// Everything worth keeping from one retrieved VM object: the inventory
/// record plus the placement-relevant references the record itself does not
/// carry.
#[derive(Debug, Clone)]
pub struct ParsedVm {
    pub record: VirtualMachineRecord,
    pub guest_id: String,
    pub parent: Option<ManagedObjectRef>,
    pub resource_pool: Option<ManagedObjectRef>,
    pub datastore_refs: Vec<ManagedObjectRef>,
    pub disk_capacities_bytes: Vec<i64>,
}

pub fn parse_vm(
    moref: &ManagedObjectRef,
    props: &HashMap<String, Value>,
    host_names: &HashMap<String, String>,
) -> Option<ParsedVm> {
    let summary = props.get("summary")?;

    let mut disk_capacities_kb = Vec::new();
    let mut disk_capacities_bytes = Vec::new();
    if let Some(devices) = props.get("config.hardware.device").and_then(Value::as_array) {
        for device in devices {
            if device.get("_typeName").and_then(Value::as_str) == Some("VirtualDisk") {
                if let Some(kb) = device.get("capacityInKB").and_then(Value::as_i64) {
                    disk_capacities_kb.push(kb);
                }
                if let Some(bytes) = device.get("capacityInBytes").and_then(Value::as_i64) {
                    disk_capacities_bytes.push(bytes);
                }
            }
        }
    }

    let host_name = props
        .get("runtime.host")
        .and_then(moref_from_value)
        .and_then(|host| host_names.get(&host.id).cloned());

    let boot_time = str_at(summary, &["runtime", "bootTime"])
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|time| time.with_timezone(&Utc));

    let record = VirtualMachineRecord {
        moref: moref.clone(),
        name: str_at(summary, &["config", "name"])?,
        uuid: str_at(summary, &["config", "uuid"]).unwrap_or_default(),
        power_state: path(summary, &["runtime", "powerState"])
            .map(power_state_from)
            .unwrap_or(PowerState::PoweredOff),
        guest_full_name: str_at(summary, &["config", "guestFullName"]).unwrap_or_default(),
        num_cpu: u64_at(summary, &["config", "numCpu"]).unwrap_or(0) as u32,
        memory_mb: u64_at(summary, &["config", "memorySizeMB"]).unwrap_or(0),
        disk_capacities_kb,
        ip_address: str_at(summary, &["guest", "ipAddress"]),
        hostname: str_at(summary, &["guest", "hostName"]),
        tools_status: str_at(summary, &["guest", "toolsStatus"]),
        host_name,
        annotation: props
            .get("config.annotation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        boot_time,
        quick_stats: QuickStats {
            overall_cpu_usage_mhz: u64_at(summary, &["quickStats", "overallCpuUsage"])
                .map(|v| v as u32),
            guest_memory_usage_mb: u64_at(summary, &["quickStats", "guestMemoryUsage"])
                .map(|v| v as u32),
            uptime_seconds: u64_at(summary, &["quickStats", "uptimeSeconds"]),
        },
        is_template: path(summary, &["config", "template"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    Some(ParsedVm {
        record,
        guest_id: props
            .get("config.guestId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        parent: props.get("parent").and_then(moref_from_value),
        resource_pool: props.get("resourcePool").and_then(moref_from_value),
        datastore_refs: props
            .get("datastore")
            .and_then(Value::as_array)
            .map(|refs| refs.iter().filter_map(moref_from_value).collect())
            .unwrap_or_default(),
        disk_capacities_bytes,
    })
}

pub fn template_record(
    parsed: &ParsedVm,
    datastores: &HashMap<String, DatastoreRecord>,
) -> TemplateRecord {
    TemplateRecord {
        moref: parsed.record.moref.clone(),
        name: parsed.record.name.clone(),
        uuid: parsed.record.uuid.clone(),
        guest_id: parsed.guest_id.clone(),
        guest_full_name: parsed.record.guest_full_name.clone(),
        disk_capacities_bytes: parsed.disk_capacities_bytes.clone(),
        parent: parsed.parent.clone(),
        resource_pool: parsed.resource_pool.clone(),
        datastores: parsed
            .datastore_refs
            .iter()
            .filter_map(|moref| datastores.get(&moref.id).cloned())
            .collect(),
    }
}

pub fn parse_host(moref: &ManagedObjectRef, props: &HashMap<String, Value>) -> Option<HostRecord> {
    let summary = props.get("summary")?;
    Some(HostRecord {
        moref: moref.clone(),
        name: props
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)?,
        overall_status: str_at(summary, &["overallStatus"]).unwrap_or_default(),
        connection_state: props
            .get("runtime.connectionState")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        power_state: props
            .get("runtime.powerState")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        num_cpu_cores: u64_at(summary, &["hardware", "numCpuCores"]).unwrap_or(0) as u32,
        cpu_mhz_per_core: u64_at(summary, &["hardware", "cpuMhz"]).unwrap_or(0) as u32,
        cpu_usage_mhz: u64_at(summary, &["quickStats", "overallCpuUsage"]).unwrap_or(0) as u32,
        memory_total_bytes: u64_at(summary, &["hardware", "memorySize"]).unwrap_or(0),
        memory_usage_mb: u64_at(summary, &["quickStats", "overallMemoryUsage"]).unwrap_or(0),
        vm_count: props
            .get("vm")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0),
    })
}

pub fn parse_datastore(
    moref: &ManagedObjectRef,
    props: &HashMap<String, Value>,
) -> Option<DatastoreRecord> {
    let summary = props.get("summary")?;
    Some(DatastoreRecord {
        moref: moref.clone(),
        name: str_at(summary, &["name"])?,
        ds_type: str_at(summary, &["type"]).unwrap_or_default(),
        capacity_bytes: u64_at(summary, &["capacity"]).unwrap_or(0),
        free_space_bytes: u64_at(summary, &["freeSpace"]).unwrap_or(0),
        url: str_at(summary, &["url"]).unwrap_or_default(),
        accessible: path(summary, &["accessible"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Interpret a task's `info.result` value.
pub fn task_result_from_value(value: &Value) -> Option<TaskResult> {
    if value.is_null() {
        return None;
    }
    if let Some(moref) = moref_from_value(value) {
        return Some(TaskResult::Object(moref));
    }
    if let Some(results) = value.as_array() {
        let mut files = Vec::new();
        for result in results {
            let folder = result
                .get("folderPath")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string();
            if let Some(entries) = result.get("file").and_then(Value::as_array) {
                for entry in entries {
                    let Some(name) = entry.get("path").and_then(Value::as_str) else {
                        continue;
                    };
                    let path = if folder.is_empty() {
                        name.to_string()
                    } else if folder.ends_with(']') {
                        format!("{} {}", folder, name)
                    } else {
                        format!("{}/{}", folder, name)
                    };
                    files.push(DatastoreFile {
                        path,
                        size_bytes: entry.get("fileSize").and_then(Value::as_u64).unwrap_or(0),
                    });
                }
            }
        }
        return Some(TaskResult::Files(files));
    }
    None
}

/// Map a WaitForUpdatesEx response body into an update batch. Only task
/// objects are of interest; anything else on the stream is dropped here.
pub fn parse_update_set(response: &Value) -> Option<UpdateBatch> {
    let version = response.get("version")?.as_str()?.to_string();
    let mut updates = Vec::new();

    if let Some(filter_set) = response.get("filterSet").and_then(Value::as_array) {
        for filter_update in filter_set {
            let Some(object_set) = filter_update.get("objectSet").and_then(Value::as_array) else {
                continue;
            };
            for object_update in object_set {
                let Some(obj) = object_update.get("obj").and_then(moref_from_value) else {
                    continue;
                };
                if obj.kind != "Task" {
                    continue;
                }
                let mut state = None;
                let mut result = None;
                let mut error_message = None;
                if let Some(change_set) = object_update.get("changeSet").and_then(Value::as_array)
                {
                    for change in change_set {
                        let name = change.get("name").and_then(Value::as_str).unwrap_or("");
                        let val = change.get("val").unwrap_or(&Value::Null);
                        match name {
                            "info.state" => {
                                state = match val.as_str() {
                                    Some("queued") => Some(TaskState::Queued),
                                    Some("running") => Some(TaskState::Running),
                                    Some("success") => Some(TaskState::Success),
                                    Some("error") => Some(TaskState::Error),
                                    _ => None,
                                }
                            }
                            "info.result" => result = task_result_from_value(val),
                            "info.error" => {
                                error_message = val
                                    .get("localizedMessage")
                                    .and_then(Value::as_str)
                                    .map(str::to_string)
                            }
                            _ => {}
                        }
                    }
                }
                if let Some(state) = state {
                    updates.push(TaskUpdate {
                        task: vesper_core::vim::types::TaskKey::new(obj.id),
                        state,
                        result,
                        error_message,
                    });
                }
            }
        }
    }

    Some(UpdateBatch { version, updates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vesper_core::vim::types::TaskKey;

    #[test]
    fn clone_body_omits_datastore_unless_relocating() {
        let spec = CloneSpec {
            folder: ManagedObjectRef::new("Folder", "group-v3"),
            resource_pool: ManagedObjectRef::new("ResourcePool", "resgroup-8"),
            datastore: None,
            power_on: false,
            template: false,
        };
        let body = clone_body(&spec.folder.clone(), "web01", &spec);
        assert!(body["spec"]["location"].get("datastore").is_none());
        assert_eq!(body["spec"]["powerOn"], Value::Bool(false));

        let relocating = CloneSpec {
            datastore: Some(ManagedObjectRef::new("Datastore", "datastore-11")),
            ..spec
        };
        let body = clone_body(&relocating.folder.clone(), "web01", &relocating);
        assert_eq!(
            body["spec"]["location"]["datastore"]["value"],
            Value::String("datastore-11".to_string())
        );
    }

    #[test]
    fn config_spec_serializes_devices_and_boot_order() {
        let spec = VmConfigSpec {
            name: Some("iso01".to_string()),
            guest_id: Some("ubuntu64Guest".to_string()),
            files_datastore_path: Some("[DS1] iso01".to_string()),
            device_changes: vec![DeviceChange {
                operation: DeviceOperation::Add,
                file_operation: Some(FileOperation::Create),
                device: VirtualDevice::Disk {
                    key: -101,
                    controller_key: -100,
                    unit_number: 0,
                    capacity_kb: 10 * 1024 * 1024,
                    thin_provisioned: true,
                    file_path: "[DS1] iso01/iso01.vmdk".to_string(),
                },
            }],
            boot_order: vec![BootDevice::Cdrom, BootDevice::Disk { device_key: -101 }],
            ..Default::default()
        };

        let body = config_spec_value(&spec);
        assert_eq!(body["files"]["vmPathName"], "[DS1] iso01");
        assert_eq!(body["deviceChange"][0]["fileOperation"], "create");
        assert_eq!(
            body["deviceChange"][0]["device"]["backing"]["thinProvisioned"],
            Value::Bool(true)
        );
        assert_eq!(
            body["bootOptions"]["bootOrder"][0]["_typeName"],
            "VirtualMachineBootOptionsBootableCdromDevice"
        );
        assert_eq!(body["bootOptions"]["bootOrder"][1]["deviceKey"], -101);
    }

    #[test]
    fn reconfigure_spec_stays_minimal() {
        let spec = VmConfigSpec {
            num_cpus: Some(2),
            memory_mb: Some(4096),
            ..Default::default()
        };
        let body = config_spec_value(&spec);
        assert_eq!(body["numCPUs"], 2);
        assert_eq!(body["memoryMB"], 4096);
        assert!(body.get("deviceChange").is_none());
        assert!(body.get("bootOptions").is_none());
        assert!(body.get("name").is_none());
    }

    #[test]
    fn update_set_parses_terminal_task_states() {
        let response = json!({
            "version": "v12",
            "filterSet": [{
                "filter": {"type": "PropertyFilter", "value": "session[1]filter-1"},
                "objectSet": [
                    {
                        "kind": "modify",
                        "obj": {"type": "Task", "value": "task-77"},
                        "changeSet": [
                            {"name": "info.state", "op": "assign", "val": "success"},
                            {"name": "info.result", "op": "assign",
                             "val": {"_typeName": "ManagedObjectReference",
                                     "type": "VirtualMachine", "value": "vm-42"}}
                        ]
                    },
                    {
                        "kind": "modify",
                        "obj": {"type": "Task", "value": "task-78"},
                        "changeSet": [
                            {"name": "info.state", "op": "assign", "val": "error"},
                            {"name": "info.error", "op": "assign",
                             "val": {"localizedMessage": "A general system error occurred"}}
                        ]
                    },
                    {
                        "kind": "modify",
                        "obj": {"type": "VirtualMachine", "value": "vm-1"},
                        "changeSet": [{"name": "runtime.powerState", "op": "assign", "val": "poweredOn"}]
                    }
                ]
            }]
        });

        let batch = parse_update_set(&response).unwrap();
        assert_eq!(batch.version, "v12");
        assert_eq!(batch.updates.len(), 2);
        assert_eq!(batch.updates[0].task, TaskKey::new("task-77"));
        assert_eq!(batch.updates[0].state, TaskState::Success);
        assert_eq!(
            batch.updates[0]
                .result
                .as_ref()
                .and_then(|r| r.as_object())
                .map(|m| m.id.as_str()),
            Some("vm-42")
        );
        assert_eq!(batch.updates[1].state, TaskState::Error);
        assert_eq!(
            batch.updates[1].error_message.as_deref(),
            Some("A general system error occurred")
        );
    }

    #[test]
    fn search_results_flatten_to_full_datastore_paths() {
        let value = json!([
            {
                "_typeName": "HostDatastoreBrowserSearchResults",
                "folderPath": "[ISOs] ubuntu",
                "file": [
                    {"_typeName": "FileInfo", "path": "ubuntu-24.04.iso", "fileSize": 2147483648u64}
                ]
            },
            {
                "_typeName": "HostDatastoreBrowserSearchResults",
                "folderPath": "[ISOs]",
                "file": [
                    {"_typeName": "FileInfo", "path": "memtest.iso", "fileSize": 4194304}
                ]
            }
        ]);

        let result = task_result_from_value(&value).unwrap();
        match result {
            TaskResult::Files(files) => {
                let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
                assert_eq!(
                    paths,
                    vec!["[ISOs] ubuntu/ubuntu-24.04.iso", "[ISOs] memtest.iso"]
                );
            }
            other => panic!("expected files, got {:?}", other),
        }
    }

    #[test]
    fn vm_record_parses_from_property_set() {
        let mut props = HashMap::new();
        props.insert(
            "summary".to_string(),
            json!({
                "config": {
                    "name": "web01",
                    "uuid": "4204aa-bb",
                    "guestFullName": "Ubuntu Linux (64-bit)",
                    "numCpu": 2,
                    "memorySizeMB": 4096,
                    "template": false
                },
                "runtime": {"powerState": "poweredOn", "bootTime": "2026-08-01T10:15:00Z"},
                "guest": {"ipAddress": "10.0.0.5", "hostName": "web01.lab", "toolsStatus": "toolsOk"},
                "quickStats": {"overallCpuUsage": 500, "guestMemoryUsage": 1024, "uptimeSeconds": 3600}
            }),
        );
        props.insert(
            "config.hardware.device".to_string(),
            json!([
                {"_typeName": "VirtualDisk", "capacityInKB": 10485760, "capacityInBytes": 10737418240u64},
                {"_typeName": "VirtualVmxnet3"}
            ]),
        );
        props.insert(
            "runtime.host".to_string(),
            json!({"type": "HostSystem", "value": "host-9"}),
        );
        let mut host_names = HashMap::new();
        host_names.insert("host-9".to_string(), "esxi-1.lab".to_string());

        let moref = ManagedObjectRef::virtual_machine("vm-42");
        let parsed = parse_vm(&moref, &props, &host_names).unwrap();
        assert_eq!(parsed.record.name, "web01");
        assert_eq!(parsed.record.disk_capacities_kb, vec![10485760]);
        assert_eq!(parsed.record.host_name.as_deref(), Some("esxi-1.lab"));
        assert_eq!(parsed.record.quick_stats.uptime_seconds, Some(3600));
        assert!(parsed.record.boot_time.is_some());
    }
}
