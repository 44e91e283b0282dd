//! The container runtime boundary: types, the [`client::RuntimeClient`]
//! trait, and a `bollard`-backed implementation.

pub mod bollard_client;
pub mod client;
pub mod types;

pub use bollard_client::BollardRuntimeClient;
pub use client::RuntimeClient;
pub use types::{
    canonicalize_name, ContainerInspect, ContainerSummary, RuntimeEvent, RuntimeEventKind,
};
