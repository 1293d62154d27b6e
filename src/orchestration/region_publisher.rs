//! Region Publisher - Runs the publish workflow for one region
//!
//! Standard workflow, per configured virtualization type:
//! 1. Register the transferred snapshot as an image
//! 2. Tag it and apply visibility
//!
//! The isolated workflow registers a private source image, copies it across
//! the partition boundary, then tags the copy. Only the copy is recorded.
//!
//! The image is transferred once per region and shared by every variant.

use crate::core::config::ImageConfiguration;
use crate::core::error::PublishError;
use crate::core::traits::{DriverSet, DriverVariant, PublishedImage, RegionPublisher, WorkflowStep};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Publisher for regions using the standard workflow
pub struct StandardRegionPublisher {
    region: String,
    config: Arc<ImageConfiguration>,
}

impl StandardRegionPublisher {
    pub fn new(region: &str, config: Arc<ImageConfiguration>) -> Self {
        Self {
            region: region.to_string(),
            config,
        }
    }
}

#[async_trait]
impl RegionPublisher for StandardRegionPublisher {
    fn variant(&self) -> DriverVariant {
        DriverVariant::Standard
    }

    async fn publish(
        &self,
        drivers: &dyn DriverSet,
        image_path: &Path,
    ) -> Result<Vec<PublishedImage>, PublishError> {
        let region = self.region.as_str();
        let snapshot = drivers
            .transfer_image(image_path)
            .await
            .map_err(|e| PublishError::step(region, WorkflowStep::Transfer, e))?;
        debug!(snapshot = %snapshot.id, "image transferred");

        let mut records = Vec::with_capacity(self.config.virtualization_types.len());
        for &virtualization in &self.config.virtualization_types {
            let image = drivers
                .register_image(&snapshot, virtualization, &self.config)
                .await
                .map_err(|e| PublishError::step(region, WorkflowStep::Register, e))?;

            drivers
                .tag_image(&image, &self.config)
                .await
                .map_err(|e| PublishError::step(region, WorkflowStep::Tag, e))?;

            info!(image = %image.id, %virtualization, "image published");
            records.push(PublishedImage::new(region, &image));
        }

        check_records(region, records)
    }
}

/// Publisher for isolated or separate-partition regions
pub struct IsolatedRegionPublisher {
    region: String,
    config: Arc<ImageConfiguration>,
}

impl IsolatedRegionPublisher {
    pub fn new(region: &str, config: Arc<ImageConfiguration>) -> Self {
        Self {
            region: region.to_string(),
            config,
        }
    }
}

#[async_trait]
impl RegionPublisher for IsolatedRegionPublisher {
    fn variant(&self) -> DriverVariant {
        DriverVariant::Isolated
    }

    async fn publish(
        &self,
        drivers: &dyn DriverSet,
        image_path: &Path,
    ) -> Result<Vec<PublishedImage>, PublishError> {
        let region = self.region.as_str();
        let snapshot = drivers
            .transfer_image(image_path)
            .await
            .map_err(|e| PublishError::step(region, WorkflowStep::Transfer, e))?;
        debug!(snapshot = %snapshot.id, "image transferred");

        let mut records = Vec::with_capacity(self.config.virtualization_types.len());
        for &virtualization in &self.config.virtualization_types {
            let source = drivers
                .register_image(&snapshot, virtualization, &self.config)
                .await
                .map_err(|e| PublishError::step(region, WorkflowStep::Register, e))?;

            let copy = drivers
                .cross_partition_copy(&source, &self.config)
                .await
                .map_err(|e| PublishError::step(region, WorkflowStep::CrossPartitionCopy, e))?;

            drivers
                .tag_image(&copy, &self.config)
                .await
                .map_err(|e| PublishError::step(region, WorkflowStep::Tag, e))?;

            info!(image = %copy.id, source = %source.id, %virtualization, "image published");
            records.push(PublishedImage::new(region, &copy));
        }

        check_records(region, records)
    }
}

/// Pick the publisher matching a driver variant
pub fn publisher_for(
    variant: DriverVariant,
    region: &str,
    config: Arc<ImageConfiguration>,
) -> Box<dyn RegionPublisher> {
    match variant {
        DriverVariant::Standard => Box::new(StandardRegionPublisher::new(region, config)),
        DriverVariant::Isolated => Box::new(IsolatedRegionPublisher::new(region, config)),
    }
}

// A successful region yields at least one image and no id twice
fn check_records(
    region: &str,
    records: Vec<PublishedImage>,
) -> Result<Vec<PublishedImage>, PublishError> {
    if records.is_empty() {
        return Err(PublishError::WorkflowStep {
            region: region.to_string(),
            step: WorkflowStep::Register,
            message: "no virtualization types configured".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.image_id.as_str()) {
            return Err(PublishError::WorkflowStep {
                region: region.to_string(),
                step: WorkflowStep::Register,
                message: format!("provider returned image id {} twice", record.image_id),
            });
        }
    }

    Ok(records)
}
