//! Core traits and types for AMI publishing
//!
//! This module defines the capability bundle a region workflow runs against
//! ([`DriverSet`]), the per-region workflow itself ([`RegionPublisher`]) and
//! the record a successful workflow produces ([`PublishedImage`]).

use crate::core::config::{ImageConfiguration, RegionConfig};
use crate::core::error::{DriverError, PublishError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ============================================================================
// Variants and steps
// ============================================================================

/// Workflow variant of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverVariant {
    Standard,
    Isolated,
}

impl DriverVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverVariant::Standard => "standard",
            DriverVariant::Isolated => "isolated",
        }
    }
}

impl fmt::Display for DriverVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a region publish workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Transfer,
    Register,
    Tag,
    CrossPartitionCopy,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowStep::Transfer => "image transfer",
            WorkflowStep::Register => "image registration",
            WorkflowStep::Tag => "tagging",
            WorkflowStep::CrossPartitionCopy => "cross-partition copy",
        })
    }
}

/// Virtualization type of a registered image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualizationType {
    Hvm,
    Paravirtual,
}

impl VirtualizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtualizationType::Hvm => "hvm",
            VirtualizationType::Paravirtual => "paravirtual",
        }
    }
}

impl fmt::Display for VirtualizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root device storage of a registered image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Ebs,
}

// ============================================================================
// Intermediate handles
// ============================================================================

/// Snapshot created from the transferred machine image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
}

/// Image registered (or copied) in the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub virtualization: VirtualizationType,
    pub encrypted: bool,
}

// ============================================================================
// Published image record
// ============================================================================

/// Result of publishing one image variant into one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedImage {
    pub region: String,
    pub image_id: String,
    pub virtualization: VirtualizationType,
    pub storage: StorageType,
    pub encrypted: bool,
    pub published_at: DateTime<Utc>,
}

impl PublishedImage {
    pub fn new(region: &str, image: &ImageHandle) -> Self {
        Self {
            region: region.to_string(),
            image_id: image.id.clone(),
            virtualization: image.virtualization,
            storage: StorageType::Ebs,
            encrypted: image.encrypted,
            published_at: Utc::now(),
        }
    }
}

// ============================================================================
// Driver set
// ============================================================================

/// Capability bundle a region workflow runs against
///
/// One instance is constructed per region publish and owned by the task
/// running it. Construction must not touch the network; the first call
/// does.
#[async_trait]
pub trait DriverSet: Send + Sync {
    /// Which workflow variant this driver set implements
    fn variant(&self) -> DriverVariant;

    /// Region the driver set is bound to
    fn region(&self) -> &str;

    /// Move the machine image into provider storage and import it as a snapshot
    async fn transfer_image(&self, image_path: &Path) -> Result<Snapshot, DriverError>;

    /// Register a bootable image from `snapshot`
    async fn register_image(
        &self,
        snapshot: &Snapshot,
        virtualization: VirtualizationType,
        config: &ImageConfiguration,
    ) -> Result<ImageHandle, DriverError>;

    /// Apply tags, sharing and visibility to `image`
    async fn tag_image(
        &self,
        image: &ImageHandle,
        config: &ImageConfiguration,
    ) -> Result<(), DriverError>;

    /// Copy `image` across the partition boundary, re-encrypting if configured
    async fn cross_partition_copy(
        &self,
        image: &ImageHandle,
        config: &ImageConfiguration,
    ) -> Result<ImageHandle, DriverError>;
}

/// Builds the driver set for one region
///
/// Called from inside the region's task, so a failure here is scoped to
/// that region.
pub trait DriverFactory: Send + Sync {
    fn build(
        &self,
        region: &RegionConfig,
        variant: DriverVariant,
    ) -> Result<Box<dyn DriverSet>, DriverError>;
}

// ============================================================================
// Region publisher
// ============================================================================

/// Full publish workflow for exactly one region
#[async_trait]
pub trait RegionPublisher: Send + Sync {
    fn variant(&self) -> DriverVariant;

    /// Run the workflow once; the first failing step aborts the rest
    async fn publish(
        &self,
        drivers: &dyn DriverSet,
        image_path: &Path,
    ) -> Result<Vec<PublishedImage>, PublishError>;
}
