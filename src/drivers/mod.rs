//! Driver sets
//!
//! Capability bundles a region workflow runs against, and the provider
//! client they are built on.

pub mod driver_loader;
pub mod http_provider;
pub mod isolated;
pub mod provider;
pub mod standard;

pub use driver_loader::{ProviderDriverFactory, select_variant};
pub use http_provider::{HttpProviderApi, SnapshotPolling};
pub use isolated::IsolatedDriverSet;
pub use provider::{CopyImageRequest, LaunchPermission, ProviderApi, RegisterImageRequest};
pub use standard::StandardDriverSet;
