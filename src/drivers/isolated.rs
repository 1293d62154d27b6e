//! Isolated region driver set
//!
//! Isolated regions sit in a separate partition: images are registered
//! private and only become usable through a partition-local copy, which is
//! re-encrypted with the region's own key when one is configured.

use crate::core::config::{ImageConfiguration, RegionConfig};
use crate::core::error::DriverError;
use crate::core::traits::{DriverSet, DriverVariant, ImageHandle, Snapshot, VirtualizationType};
use crate::drivers::provider::{
    CopyImageRequest, LaunchPermission, ProviderApi, RegisterImageRequest, transfer_via_bucket,
};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Driver set for network-isolated or separate-partition regions
pub struct IsolatedDriverSet<A> {
    region: String,
    bucket: String,
    kms_key_id: Option<String>,
    api: A,
}

impl<A: ProviderApi> IsolatedDriverSet<A> {
    pub fn new(region: &RegionConfig, api: A) -> Self {
        Self {
            region: region.name.clone(),
            bucket: region.bucket_name.clone(),
            kms_key_id: region.kms_key().map(str::to_string),
            api,
        }
    }
}

#[async_trait]
impl<A: ProviderApi> DriverSet for IsolatedDriverSet<A> {
    fn variant(&self) -> DriverVariant {
        DriverVariant::Isolated
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn transfer_image(&self, image_path: &Path) -> Result<Snapshot, DriverError> {
        transfer_via_bucket(&self.api, &self.bucket, image_path).await
    }

    async fn register_image(
        &self,
        snapshot: &Snapshot,
        virtualization: VirtualizationType,
        config: &ImageConfiguration,
    ) -> Result<ImageHandle, DriverError> {
        // Encryption happens on the partition-local copy
        let request = RegisterImageRequest {
            name: format!("{}-source", config.image_name(virtualization)),
            description: config.description.clone(),
            snapshot_id: snapshot.id.clone(),
            virtualization,
            architecture: config.architecture,
            encrypted: false,
            kms_key_id: None,
        };

        let id = self.api.register_image(&request).await?;
        Ok(ImageHandle {
            id,
            virtualization,
            encrypted: false,
        })
    }

    async fn tag_image(
        &self,
        image: &ImageHandle,
        config: &ImageConfiguration,
    ) -> Result<(), DriverError> {
        if !config.tags.is_empty() {
            self.api.create_tags(&image.id, &config.tags).await?;
        }

        if !config.shared_with_accounts.is_empty() {
            let permission = LaunchPermission {
                public: false,
                accounts: config.shared_with_accounts.clone(),
            };
            self.api.set_launch_permission(&image.id, &permission).await?;
        }

        Ok(())
    }

    async fn cross_partition_copy(
        &self,
        image: &ImageHandle,
        config: &ImageConfiguration,
    ) -> Result<ImageHandle, DriverError> {
        let encrypted = config.encrypted || self.kms_key_id.is_some();
        let request = CopyImageRequest {
            source_image_id: image.id.clone(),
            name: config.image_name(image.virtualization),
            description: config.description.clone(),
            encrypted,
            kms_key_id: self.kms_key_id.clone(),
        };

        let id = self.api.copy_image(&request).await?;
        info!(source = %image.id, copy = %id, encrypted, "image copied into partition");

        Ok(ImageHandle {
            id,
            virtualization: image.virtualization,
            encrypted,
        })
    }
}
