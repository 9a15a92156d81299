//! pvecoord: admission control and VM ID allocation for concurrent Proxmox provisioning.

mod allocator;
mod vmid;

pub mod authority;
pub mod client;
pub mod config;
pub mod coordination;
pub mod gate;
pub mod logging;
pub mod provider;
pub mod resource_id;

pub use authority::{AuthorityError, IdAuthority};
pub use client::ApiClient;
pub use config::{ConfigError, Credentials, ProviderConfig, Secret};
pub use coordination::{Coordination, Parallelism};
pub use gate::{ApiLock, GateError};
pub use logging::LogConfig;
pub use provider::Provider;
pub use resource_id::{ClusterResourceId, ResourceId, ResourceIdError};
pub use vmid::{ParseVmIdError, VmId};

/// pvecoord version from Cargo.toml
pub const PVECOORD_VERSION: &str = env!("CARGO_PKG_VERSION");
