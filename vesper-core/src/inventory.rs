//! Read-through inventory queries.
//!
//! Pure mapping from session records to the API's view shapes, plus the one
//! inventory query that is itself a long-running task: searching a datastore
//! for ISO images.

use tracing::debug;

use crate::error::{Result, VesperError};
use crate::task_watcher::TaskWatcher;
use crate::types::{
    DatastoreSummary, HostSummary, TemplateSummary, VmDetails, VmMetrics, VmSummary,
};
use crate::vim::session::VimSession;
use crate::vim::types::{
    DatastoreRecord, HostRecord, TaskResult, TemplateRecord, VirtualMachineRecord,
};

const KB_PER_GB: f64 = 1024.0 * 1024.0;
const BYTES_PER_MB: u64 = 1024 * 1024;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Total virtual disk capacity in GB, rounded to two decimals; 0 for VMs
/// with no disks.
fn total_disk_gb(disk_capacities_kb: &[i64]) -> f64 {
    let total_kb: i64 = disk_capacities_kb.iter().sum();
    if total_kb > 0 {
        round2(total_kb as f64 / KB_PER_GB)
    } else {
        0.0
    }
}

pub fn vm_summary(record: &VirtualMachineRecord) -> VmSummary {
    VmSummary {
        name: record.name.clone(),
        power_state: record.power_state.to_string(),
        guest_os: record.guest_full_name.clone(),
        ip_address: record.ip_address.clone(),
        uuid: record.uuid.clone(),
        cpu_count: record.num_cpu,
        memory_mb: record.memory_mb,
        disk_gb: total_disk_gb(&record.disk_capacities_kb),
        hostname: record.hostname.clone(),
        vmware_tools_status: record
            .tools_status
            .clone()
            .unwrap_or_else(|| "toolsNotInstalled".to_string()),
    }
}

pub fn vm_details(record: &VirtualMachineRecord) -> VmDetails {
    VmDetails {
        summary: vm_summary(record),
        host_name: record.host_name.clone(),
        annotation: record.annotation.clone(),
        moid: record.moref.id.clone(),
        boot_time: record.boot_time,
    }
}

/// Quick-stats metrics. The CPU figure is the crude MHz-derived
/// approximation the endpoint's summary allows without PerfManager queries.
pub fn vm_metrics(record: &VirtualMachineRecord) -> VmMetrics {
    let cpu_usage_percent = record
        .quick_stats
        .overall_cpu_usage_mhz
        .map(|mhz| mhz as f64 / 1000.0)
        .unwrap_or(0.0);
    let memory_usage_percent = match record.quick_stats.guest_memory_usage_mb {
        Some(used) if record.memory_mb > 0 => {
            round2(used as f64 / record.memory_mb as f64 * 100.0)
        }
        _ => 0.0,
    };
    VmMetrics {
        cpu_usage_percent,
        memory_usage_percent,
        uptime_seconds: record.quick_stats.uptime_seconds.unwrap_or(0),
    }
}

pub fn host_summary(record: &HostRecord) -> HostSummary {
    let total_cpu_mhz = record.cpu_mhz_per_core as u64 * record.num_cpu_cores as u64;
    let cpu_usage_percent = if total_cpu_mhz > 0 {
        round2(record.cpu_usage_mhz as f64 / total_cpu_mhz as f64 * 100.0)
    } else {
        0.0
    };
    HostSummary {
        moid: record.moref.id.clone(),
        name: record.name.clone(),
        overall_status: record.overall_status.clone(),
        connection_state: record.connection_state.clone(),
        power_state: record.power_state.clone(),
        cpu_cores: record.num_cpu_cores,
        cpu_usage_percent,
        memory_total_bytes: record.memory_total_bytes,
        memory_used_bytes: record.memory_usage_mb * BYTES_PER_MB,
        vm_count: record.vm_count,
    }
}

pub fn datastore_summary(record: &DatastoreRecord) -> DatastoreSummary {
    DatastoreSummary {
        moid: record.moref.id.clone(),
        name: record.name.clone(),
        ds_type: record.ds_type.clone(),
        capacity_bytes: record.capacity_bytes,
        free_space_bytes: record.free_space_bytes,
        url: record.url.clone(),
        accessible: record.accessible,
    }
}

pub fn template_summary(record: &TemplateRecord) -> TemplateSummary {
    TemplateSummary {
        uuid: record.uuid.clone(),
        name: record.name.clone(),
        guest_os: record.guest_full_name.clone(),
        disk_capacity_bytes: record.disk_capacities_bytes.iter().sum(),
        datastore_name: record.datastores.first().map(|ds| ds.name.clone()),
    }
}

/// List ISO images on a datastore. The browser search is a server-side task
/// like any other, so it goes through the watcher rather than being polled.
pub async fn list_isos(
    session: &dyn VimSession,
    watcher: &TaskWatcher,
    datastore_name: &str,
) -> Result<Vec<String>> {
    let datastore = session
        .find_datastore(datastore_name)
        .await?
        .ok_or_else(|| VesperError::not_found(format!("datastore '{}'", datastore_name)))?;

    let key = session
        .search_datastore_task(&datastore.moref, "*.iso")
        .await?;
    let deadline = watcher.task_timeout();
    let handle = watcher.submit(key).await?;
    let result = watcher
        .wait(handle)
        .await?
        .into_result("SearchDatastoreSubFolders_Task", deadline)?;

    let mut isos = match result {
        Some(TaskResult::Files(files)) => {
            files.into_iter().map(|file| file.path).collect::<Vec<_>>()
        }
        _ => Vec::new(),
    };
    isos.sort();
    debug!(
        "found {} ISO images on datastore '{}'",
        isos.len(),
        datastore_name
    );
    Ok(isos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vim::types::{ManagedObjectRef, PowerState, QuickStats};
    use pretty_assertions::assert_eq;

    fn record() -> VirtualMachineRecord {
        VirtualMachineRecord {
            moref: ManagedObjectRef::virtual_machine("vm-42"),
            name: "web01".to_string(),
            uuid: "4204aa-bb".to_string(),
            power_state: PowerState::PoweredOn,
            guest_full_name: "Ubuntu Linux (64-bit)".to_string(),
            num_cpu: 2,
            memory_mb: 4096,
            disk_capacities_kb: vec![10 * 1024 * 1024, 5 * 1024 * 1024],
            ip_address: Some("10.0.0.5".to_string()),
            hostname: Some("web01.lab".to_string()),
            tools_status: Some("toolsOk".to_string()),
            host_name: Some("esxi-1.lab".to_string()),
            annotation: String::new(),
            boot_time: None,
            quick_stats: QuickStats {
                overall_cpu_usage_mhz: Some(500),
                guest_memory_usage_mb: Some(1024),
                uptime_seconds: Some(3600),
            },
            is_template: false,
        }
    }

    #[test]
    fn disk_total_is_summed_and_rounded() {
        let summary = vm_summary(&record());
        assert_eq!(summary.disk_gb, 15.0);
        assert_eq!(summary.power_state, "poweredOn");
    }

    #[test]
    fn disk_total_is_zero_without_disks() {
        let mut r = record();
        r.disk_capacities_kb.clear();
        assert_eq!(vm_summary(&r).disk_gb, 0.0);
    }

    #[test]
    fn tools_status_defaults_when_guest_info_absent() {
        let mut r = record();
        r.tools_status = None;
        assert_eq!(vm_summary(&r).vmware_tools_status, "toolsNotInstalled");
    }

    #[test]
    fn metrics_derive_from_quick_stats() {
        let metrics = vm_metrics(&record());
        assert_eq!(metrics.cpu_usage_percent, 0.5);
        assert_eq!(metrics.memory_usage_percent, 25.0);
        assert_eq!(metrics.uptime_seconds, 3600);
    }

    #[test]
    fn host_cpu_percent_handles_unknown_capacity() {
        let host = HostRecord {
            moref: ManagedObjectRef::new("HostSystem", "host-9"),
            name: "esxi-1.lab".to_string(),
            overall_status: "green".to_string(),
            connection_state: "connected".to_string(),
            power_state: "poweredOn".to_string(),
            num_cpu_cores: 0,
            cpu_mhz_per_core: 0,
            cpu_usage_mhz: 1200,
            memory_total_bytes: 64 << 30,
            memory_usage_mb: 2048,
            vm_count: 3,
        };
        let summary = host_summary(&host);
        assert_eq!(summary.cpu_usage_percent, 0.0);
        assert_eq!(summary.memory_used_bytes, 2048 * 1024 * 1024);
    }

    #[test]
    fn host_cpu_percent_from_quick_stats() {
        let host = HostRecord {
            moref: ManagedObjectRef::new("HostSystem", "host-9"),
            name: "esxi-1.lab".to_string(),
            overall_status: "green".to_string(),
            connection_state: "connected".to_string(),
            power_state: "poweredOn".to_string(),
            num_cpu_cores: 8,
            cpu_mhz_per_core: 2400,
            cpu_usage_mhz: 4800,
            memory_total_bytes: 64 << 30,
            memory_usage_mb: 2048,
            vm_count: 3,
        };
        assert_eq!(host_summary(&host).cpu_usage_percent, 25.0);
    }

    #[test]
    fn template_summary_sums_disks_and_takes_primary_datastore() {
        let template = TemplateRecord {
            moref: ManagedObjectRef::virtual_machine("vm-7"),
            name: "ubuntu-template".to_string(),
            uuid: "4204cc-dd".to_string(),
            guest_id: "ubuntu64Guest".to_string(),
            guest_full_name: "Ubuntu Linux (64-bit)".to_string(),
            disk_capacities_bytes: vec![16 << 30, 4 << 30],
            parent: None,
            resource_pool: None,
            datastores: vec![DatastoreRecord {
                moref: ManagedObjectRef::new("Datastore", "datastore-11"),
                name: "DS1".to_string(),
                ds_type: "VMFS".to_string(),
                capacity_bytes: 1 << 40,
                free_space_bytes: 1 << 39,
                url: "ds:///vmfs/volumes/abc/".to_string(),
                accessible: true,
            }],
        };
        let summary = template_summary(&template);
        assert_eq!(summary.disk_capacity_bytes, 20 << 30);
        assert_eq!(summary.datastore_name.as_deref(), Some("DS1"));
    }
}
