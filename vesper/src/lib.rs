//! Service library: REST API layer over `vesper-core` and `vesper-vim`.

pub mod api;
