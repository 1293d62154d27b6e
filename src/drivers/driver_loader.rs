//! Driver Loader - Selects and builds the driver set for a region
//!
//! Selection looks at the region's `isolated_region` flag and nothing else.
//! Building validates credentials and creates the HTTP client; neither step
//! touches the network.
//!
//! # Example
//!
//! ```no_run
//! use ami_publisher::core::{DriverFactory, RegionConfig};
//! use ami_publisher::drivers::{ProviderDriverFactory, select_variant};
//!
//! # fn example(region: &RegionConfig) -> Result<(), ami_publisher::core::DriverError> {
//! let factory = ProviderDriverFactory::new();
//! let drivers = factory.build(region, select_variant(region))?;
//! println!("{} driver set for {}", drivers.variant(), drivers.region());
//! # Ok(())
//! # }
//! ```

use crate::core::config::RegionConfig;
use crate::core::error::DriverError;
use crate::core::retry::RetryOptions;
use crate::core::traits::{DriverFactory, DriverSet, DriverVariant};
use crate::drivers::http_provider::{HttpProviderApi, SnapshotPolling};
use crate::drivers::isolated::IsolatedDriverSet;
use crate::drivers::standard::StandardDriverSet;
use crate::security::{CredentialValidator, mask_secret};
use tracing::debug;

/// Pick the workflow variant for a region
pub fn select_variant(region: &RegionConfig) -> DriverVariant {
    if region.isolated {
        DriverVariant::Isolated
    } else {
        DriverVariant::Standard
    }
}

/// Builds HTTP-backed driver sets
pub struct ProviderDriverFactory {
    retry: RetryOptions,
    polling: SnapshotPolling,
    validator: CredentialValidator,
}

impl Default for ProviderDriverFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderDriverFactory {
    pub fn new() -> Self {
        Self::with_retry(RetryOptions::default())
    }

    /// Use custom retry settings for every provider call
    pub fn with_retry(retry: RetryOptions) -> Self {
        Self {
            retry,
            polling: SnapshotPolling::default(),
            validator: CredentialValidator::new(),
        }
    }

    /// Use custom snapshot import polling for every provider client
    pub fn with_polling(mut self, polling: SnapshotPolling) -> Self {
        self.polling = polling;
        self
    }
}

impl DriverFactory for ProviderDriverFactory {
    fn build(
        &self,
        region: &RegionConfig,
        variant: DriverVariant,
    ) -> Result<Box<dyn DriverSet>, DriverError> {
        self.validator.validate(&region.credentials)?;
        let api = HttpProviderApi::new(region, self.retry.clone())?
            .with_polling(self.polling.clone());
        debug!(
            access_key = %mask_secret(&region.credentials.access_key),
            endpoint = %region.credentials.endpoint,
            "driver set built"
        );

        Ok(match variant {
            DriverVariant::Standard => Box::new(StandardDriverSet::new(region, api)),
            DriverVariant::Isolated => Box::new(IsolatedDriverSet::new(region, api)),
        })
    }
}
