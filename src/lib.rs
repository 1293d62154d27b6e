pub mod core;
pub mod drivers;
pub mod logging;
pub mod orchestration;
pub mod security;

#[cfg(test)]
pub(crate) mod testing;

pub use core::*;
pub use drivers::{ProviderDriverFactory, select_variant};
pub use logging::{LogFormat, init_logging};
pub use orchestration::{DispatchPolicy, Orchestrator, ResultAggregator, RunSummary};
pub use security::{CredentialValidator, SecretScrubber, mask_secret};
