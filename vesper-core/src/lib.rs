pub mod config;
pub mod devices;
pub mod error;
pub mod inventory;
pub mod placement;
pub mod power;
pub mod provision;
pub mod task_watcher;
pub mod types;
pub mod vim;

pub use error::{Result, VesperError, VesperResult};
pub use provision::{ProvisionFailure, ProvisionStep, Provisioner};
pub use task_watcher::{TaskHandle, TaskOutcome, TaskWatcher};

// Re-export the collaborator boundary for convenience
pub use vim::{
    connector::SessionGuard,
    session::{VimConnector, VimSession},
};
