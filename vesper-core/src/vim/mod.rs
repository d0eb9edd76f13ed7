//! Typed model of the hypervisor management endpoint and the collaborator
//! traits the core consumes. The concrete wire client lives in `vesper-vim`;
//! everything here is transport-agnostic.

pub mod connector;
pub mod mock;
pub mod session;
pub mod types;

pub use connector::SessionGuard;
pub use mock::MockVimSession;
pub use session::{VimConnector, VimSession};
pub use types::*;
