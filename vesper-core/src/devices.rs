//! Device topology construction for from-scratch VM creation.
//!
//! Only the boot-media path builds a topology; clones inherit the template's
//! hardware. Device keys are placeholders, negative and unique within one
//! submission — the endpoint assigns the real keys on creation, so nothing
//! here may assume a key survives past submission.

use crate::vim::types::{
    BootDevice, DatastoreRecord, DeviceChange, DeviceOperation, FileOperation, NetworkBacking,
    NetworkObject, VirtualDevice,
};

/// Placeholder keys for the one controller/disk/cdrom/nic topology.
const SCSI_CONTROLLER_KEY: i32 = -100;
const DISK_KEY: i32 = -101;
const CDROM_KEY: i32 = -102;
const NIC_KEY: i32 = -103;

/// Well-known key of the first IDE controller every VM carries.
const IDE_PRIMARY_CONTROLLER_KEY: i32 = 200;

const KB_PER_GB: i64 = 1024 * 1024;

/// Ordered device changes plus the boot order to submit with them.
#[derive(Debug, Clone)]
pub struct DeviceTopology {
    pub changes: Vec<DeviceChange>,
    pub boot_order: Vec<BootDevice>,
}

/// Build the device-change list for a new VM installing from boot media.
///
/// The SCSI controller comes first: controllers must exist before devices
/// reference them. The optical drive leads the boot order so unattended
/// installs boot from the media.
pub fn build_topology(
    vm_name: &str,
    disk_gb: u64,
    boot_media_path: &str,
    datastore: &DatastoreRecord,
    network: &NetworkObject,
) -> DeviceTopology {
    let controller = DeviceChange {
        operation: DeviceOperation::Add,
        file_operation: None,
        device: VirtualDevice::ScsiController {
            key: SCSI_CONTROLLER_KEY,
            bus_number: 0,
        },
    };

    let disk = DeviceChange {
        operation: DeviceOperation::Add,
        file_operation: Some(FileOperation::Create),
        device: VirtualDevice::Disk {
            key: DISK_KEY,
            controller_key: SCSI_CONTROLLER_KEY,
            unit_number: 0,
            capacity_kb: disk_gb as i64 * KB_PER_GB,
            thin_provisioned: true,
            file_path: vm_file_path(&datastore.name, vm_name),
        },
    };

    let cdrom = DeviceChange {
        operation: DeviceOperation::Add,
        file_operation: None,
        device: VirtualDevice::Cdrom {
            key: CDROM_KEY,
            controller_key: IDE_PRIMARY_CONTROLLER_KEY,
            iso_path: boot_media_path.to_string(),
            start_connected: true,
        },
    };

    let nic = DeviceChange {
        operation: DeviceOperation::Add,
        file_operation: None,
        device: VirtualDevice::EthernetAdapter {
            key: NIC_KEY,
            backing: network_backing(network),
            start_connected: true,
        },
    };

    DeviceTopology {
        changes: vec![controller, disk, cdrom, nic],
        boot_order: vec![
            BootDevice::Cdrom,
            BootDevice::Disk {
                device_key: DISK_KEY,
            },
        ],
    }
}

/// Datastore directory the VM's files live in, e.g. `[DS1] web01`.
pub fn vm_directory_path(datastore_name: &str, vm_name: &str) -> String {
    format!("[{}] {}", datastore_name, vm_name)
}

fn vm_file_path(datastore_name: &str, vm_name: &str) -> String {
    format!("[{}] {}/{}.vmdk", datastore_name, vm_name, vm_name)
}

fn network_backing(network: &NetworkObject) -> NetworkBacking {
    match network {
        NetworkObject::Standard { moref, name } => NetworkBacking::Standard {
            network: moref.clone(),
            device_name: name.clone(),
        },
        NetworkObject::DistributedPortgroup {
            portgroup_key,
            switch_uuid,
            ..
        } => NetworkBacking::DistributedPort {
            portgroup_key: portgroup_key.clone(),
            switch_uuid: switch_uuid.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vim::types::ManagedObjectRef;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn datastore() -> DatastoreRecord {
        DatastoreRecord {
            moref: ManagedObjectRef::new("Datastore", "datastore-11"),
            name: "DS1".to_string(),
            ds_type: "VMFS".to_string(),
            capacity_bytes: 1 << 40,
            free_space_bytes: 1 << 39,
            url: "ds:///vmfs/volumes/abc/".to_string(),
            accessible: true,
        }
    }

    fn standard_network() -> NetworkObject {
        NetworkObject::Standard {
            moref: ManagedObjectRef::new("Network", "network-7"),
            name: "VM Network".to_string(),
        }
    }

    #[test]
    fn controller_comes_first_and_keys_are_unique_negative_placeholders() {
        let topology = build_topology("web01", 20, "[ISOs] ubuntu.iso", &datastore(), &standard_network());

        assert!(matches!(
            topology.changes[0].device,
            VirtualDevice::ScsiController { .. }
        ));

        let keys: Vec<i32> = topology.changes.iter().map(|c| c.device.key()).collect();
        assert!(keys.iter().all(|k| *k < 0));
        let unique: HashSet<i32> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn disk_capacity_converted_to_kb_and_kept_in_vm_directory() {
        let topology =
            build_topology("web01", 20, "[ISOs] ubuntu.iso", &datastore(), &standard_network());
        let disk = topology
            .changes
            .iter()
            .find_map(|c| match &c.device {
                VirtualDevice::Disk {
                    capacity_kb,
                    thin_provisioned,
                    file_path,
                    controller_key,
                    ..
                } => Some((*capacity_kb, *thin_provisioned, file_path.clone(), *controller_key)),
                _ => None,
            })
            .expect("disk present");

        assert_eq!(disk.0, 20 * 1024 * 1024);
        assert!(disk.1, "disks are thin-provisioned by default");
        assert_eq!(disk.2, "[DS1] web01/web01.vmdk");
        assert_eq!(disk.3, SCSI_CONTROLLER_KEY);
    }

    #[test]
    fn cdrom_sits_on_first_ide_controller_and_boots_first() {
        let topology =
            build_topology("web01", 20, "[ISOs] ubuntu.iso", &datastore(), &standard_network());
        let cdrom = topology
            .changes
            .iter()
            .find_map(|c| match &c.device {
                VirtualDevice::Cdrom {
                    controller_key,
                    iso_path,
                    start_connected,
                    ..
                } => Some((*controller_key, iso_path.clone(), *start_connected)),
                _ => None,
            })
            .expect("cdrom present");

        assert_eq!(cdrom.0, IDE_PRIMARY_CONTROLLER_KEY);
        assert_eq!(cdrom.1, "[ISOs] ubuntu.iso");
        assert!(cdrom.2);
        assert_eq!(topology.boot_order[0], BootDevice::Cdrom);
    }

    #[test]
    fn distributed_portgroup_gets_port_backing() {
        let network = NetworkObject::DistributedPortgroup {
            moref: ManagedObjectRef::new("DistributedVirtualPortgroup", "dvportgroup-20"),
            name: "DVS-Prod".to_string(),
            portgroup_key: "dvportgroup-20".to_string(),
            switch_uuid: "50 2f ab 00 11 22 33 44-55 66 77 88 99 aa bb cc".to_string(),
        };
        let topology = build_topology("web01", 20, "[ISOs] ubuntu.iso", &datastore(), &network);
        let backing = topology
            .changes
            .iter()
            .find_map(|c| match &c.device {
                VirtualDevice::EthernetAdapter { backing, .. } => Some(backing.clone()),
                _ => None,
            })
            .expect("nic present");

        assert!(matches!(backing, NetworkBacking::DistributedPort { .. }));
    }
}
