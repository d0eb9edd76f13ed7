//! Power transitions for existing VMs.

use tracing::info;

use crate::error::{Result, VesperError};
use crate::task_watcher::TaskWatcher;
use crate::types::PowerAction;
use crate::vim::session::VimSession;
use crate::vim::types::PowerState;

/// Apply a power action to the VM with the given BIOS UUID, waiting for the
/// endpoint's task through the watcher. A VM already in the requested state
/// is a local no-op success; no task is submitted.
pub async fn apply_power(
    session: &dyn VimSession,
    watcher: &TaskWatcher,
    uuid: &str,
    action: PowerAction,
) -> Result<()> {
    let record = session
        .find_vm_by_uuid(uuid)
        .await?
        .ok_or_else(|| VesperError::not_found(format!("VM with UUID {}", uuid)))?;

    let desired = match action {
        PowerAction::On => PowerState::PoweredOn,
        PowerAction::Off => PowerState::PoweredOff,
    };
    let current = session.vm_power_state(&record.moref).await?;
    if current == desired {
        info!(
            "VM '{}' already {}; power request is a no-op",
            record.name, current
        );
        return Ok(());
    }

    let (key, operation) = match action {
        PowerAction::On => (
            session.power_on_vm_task(&record.moref).await?,
            "PowerOnVM_Task",
        ),
        PowerAction::Off => (
            session.power_off_vm_task(&record.moref).await?,
            "PowerOffVM_Task",
        ),
    };

    let deadline = watcher.task_timeout();
    let handle = watcher.submit(key).await?;
    watcher
        .wait(handle)
        .await?
        .into_result(operation, deadline)?;
    info!("VM '{}' {}", record.name, desired);
    Ok(())
}
