//! Concrete `VimConnector`/`VimSession` implementation over the endpoint's
//! VI/JSON protocol: the full SOAP data model exposed as JSON over HTTPS
//! (vSphere 8.0U1+), driven with reqwest.

pub mod client;
pub mod wire;

pub use client::{VimHttpConnector, VimHttpSession};
