//! Stemcell manifest
//!
//! The manifest is read once before the run and updated once, after every
//! region succeeded, with the published image ids. Keys this crate does not
//! know about are carried through untouched.

use crate::core::error::RunError;
use crate::core::traits::{PublishedImage, VirtualizationType};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Stemcell manifest (`stemcell.MF`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub name: String,

    #[serde(deserialize_with = "string_or_number")]
    pub version: String,

    #[serde(default)]
    pub cloud_properties: CloudProperties,

    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// `cloud_properties` section of the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CloudProperties {
    /// Published image ids keyed by region
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ami: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {:?}",
            other
        ))),
    }
}

impl Manifest {
    /// Parse a manifest from YAML
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RunError> {
        let manifest: Manifest = serde_yaml::from_reader(reader)
            .map_err(|e| RunError::Manifest(format!("reading manifest: {}", e)))?;

        if manifest.name.trim().is_empty() {
            return Err(RunError::Manifest("manifest name is empty".to_string()));
        }

        Ok(manifest)
    }

    /// Replace the published image map with `images`
    pub fn set_published_images(&mut self, images: &[PublishedImage]) {
        self.cloud_properties.ami = images
            .iter()
            .map(|image| (Self::ami_key(image), image.image_id.clone()))
            .collect();
    }

    fn ami_key(image: &PublishedImage) -> String {
        match image.virtualization {
            VirtualizationType::Hvm => image.region.clone(),
            other => format!("{} {}", image.region, other),
        }
    }

    /// Serialize the manifest as YAML
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), RunError> {
        serde_yaml::to_writer(writer, self)
            .map_err(|e| RunError::Manifest(format!("writing manifest: {}", e)))
    }
}
