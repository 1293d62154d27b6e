//! Standard region driver set

use crate::core::config::{ImageConfiguration, RegionConfig, Visibility};
use crate::core::error::DriverError;
use crate::core::traits::{DriverSet, DriverVariant, ImageHandle, Snapshot, VirtualizationType};
use crate::drivers::provider::{LaunchPermission, ProviderApi, RegisterImageRequest, transfer_via_bucket};
use async_trait::async_trait;
use std::path::Path;

/// Driver set for regions reachable with the regular workflow
pub struct StandardDriverSet<A> {
    region: String,
    bucket: String,
    api: A,
}

impl<A: ProviderApi> StandardDriverSet<A> {
    pub fn new(region: &RegionConfig, api: A) -> Self {
        Self {
            region: region.name.clone(),
            bucket: region.bucket_name.clone(),
            api,
        }
    }
}

#[async_trait]
impl<A: ProviderApi> DriverSet for StandardDriverSet<A> {
    fn variant(&self) -> DriverVariant {
        DriverVariant::Standard
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
        let request = RegisterImageRequest {
            name: config.image_name(virtualization),
            description: config.description.clone(),
            snapshot_id: snapshot.id.clone(),
            virtualization,
            architecture: config.architecture,
            encrypted: config.encrypted,
            kms_key_id: config.kms_key_id.clone(),
        };

        let id = self.api.register_image(&request).await?;
        Ok(ImageHandle {
            id,
            virtualization,
            encrypted: config.encrypted,
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

        let permission = LaunchPermission {
            public: config.visibility == Visibility::Public,
            accounts: config.shared_with_accounts.clone(),
        };
        if permission.public || !permission.accounts.is_empty() {
            self.api.set_launch_permission(&image.id, &permission).await?;
        }

        Ok(())
    }

    async fn cross_partition_copy(
        &self,
        _image: &ImageHandle,
        _config: &ImageConfiguration,
    ) -> Result<ImageHandle, DriverError> {
        Err(DriverError::Unsupported {
            capability: "cross-partition copy",
            variant: DriverVariant::Standard,
        })
    }
}
