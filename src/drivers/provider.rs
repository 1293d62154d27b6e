//! Provider API seam
//!
//! The raw calls a driver set is composed from. [`HttpProviderApi`] talks
//! to a region endpoint; tests substitute an in-memory implementation.
//!
//! [`HttpProviderApi`]: crate::drivers::HttpProviderApi

use crate::core::config::Architecture;
use crate::core::error::DriverError;
use crate::core::traits::{Snapshot, VirtualizationType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Request body for image registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterImageRequest {
    pub name: String,
    pub description: String,
    pub snapshot_id: String,
    pub virtualization: VirtualizationType,
    pub architecture: Architecture,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

/// Request body for an image copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyImageRequest {
    pub source_image_id: String,
    pub name: String,
    pub description: String,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

/// Who may launch an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPermission {
    pub public: bool,
    pub accounts: Vec<String>,
}

/// Raw provider operations for one region
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Upload a local file to `bucket/key`
    async fn upload_image(&self, bucket: &str, key: &str, path: &Path) -> Result<(), DriverError>;

    /// Import an uploaded object as a snapshot; returns once the snapshot is usable
    async fn import_snapshot(&self, bucket: &str, key: &str) -> Result<String, DriverError>;

    /// Register an image; returns its id
    async fn register_image(&self, request: &RegisterImageRequest) -> Result<String, DriverError>;

    async fn create_tags(
        &self,
        image_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), DriverError>;

    async fn set_launch_permission(
        &self,
        image_id: &str,
        permission: &LaunchPermission,
    ) -> Result<(), DriverError>;

    /// Copy an image inside the region's partition; returns the new id
    async fn copy_image(&self, request: &CopyImageRequest) -> Result<String, DriverError>;
}

/// Upload `image_path` into `bucket` and import it as a snapshot
///
/// Shared by both driver set variants. The object key is unique per call so
/// concurrent runs never overwrite each other's uploads.
pub(crate) async fn transfer_via_bucket<A: ProviderApi + ?Sized>(
    api: &A,
    bucket: &str,
    image_path: &Path,
) -> Result<Snapshot, DriverError> {
    let metadata = tokio::fs::metadata(image_path).await?;
    if !metadata.is_file() {
        return Err(DriverError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a file", image_path.display()),
        )));
    }

    let file_name = image_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("root.img");
    let key = format!("{}/{}", uuid::Uuid::new_v4(), file_name);

    info!(bucket, key = %key, bytes = metadata.len(), "uploading machine image");
    api.upload_image(bucket, &key, image_path).await?;

    let snapshot_id = api.import_snapshot(bucket, &key).await?;
    info!(snapshot_id = %snapshot_id, "snapshot imported");

    Ok(Snapshot { id: snapshot_id })
}
