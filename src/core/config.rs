//! Configuration structures and types for ami-publisher
//!
//! This module provides type-safe run configuration with serde support.
//! Everything here is immutable once loaded and shared read-only between
//! region tasks.

use crate::core::traits::VirtualizationType;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration object
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Settings applied to every region's images
    pub ami_configuration: ImageConfiguration,

    /// Target regions, in dispatch order
    #[serde(default)]
    pub ami_regions: Vec<RegionConfig>,
}

/// Image settings shared by all regions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageConfiguration {
    /// Image name prefix (default: "bosh-stemcell")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Image description
    pub description: String,

    /// One image is registered per entry (default: ["hvm"])
    #[serde(default = "default_virtualization_types")]
    pub virtualization_types: Vec<VirtualizationType>,

    /// Launch permission (default: public)
    #[serde(default)]
    pub visibility: Visibility,

    /// CPU architecture (default: x86_64)
    #[serde(default)]
    pub architecture: Architecture,

    /// Register encrypted images
    #[serde(default)]
    pub encrypted: bool,

    /// Key used for encrypted images in standard regions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,

    /// Accounts granted launch permission
    #[serde(default)]
    pub shared_with_accounts: Vec<String>,

    /// Tags applied to every image
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_virtualization_types() -> Vec<VirtualizationType> {
    vec![VirtualizationType::Hvm]
}

const DEFAULT_IMAGE_NAME: &str = "bosh-stemcell";

impl ImageConfiguration {
    /// Provider-side name for the image of one virtualization type
    pub fn image_name(&self, virtualization: VirtualizationType) -> String {
        format!(
            "{}-{}",
            self.name.as_deref().unwrap_or(DEFAULT_IMAGE_NAME),
            virtualization
        )
    }
}

/// Image launch permission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Image CPU architecture
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Architecture {
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
        }
    }
}

/// One target region
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// Region identifier, unique within a run
    pub name: String,

    /// Bucket the machine image is uploaded to
    #[serde(default)]
    pub bucket_name: String,

    /// Region needs the isolated workflow
    #[serde(default, rename = "isolated_region")]
    pub isolated: bool,

    /// Re-encryption key for cross-partition copies
    #[serde(default)]
    pub kms_key_id: Option<String>,

    /// Credentials bound to this region
    pub credentials: RegionCredentials,
}

impl RegionConfig {
    /// Re-encryption key, with a blank value treated as unset
    pub fn kms_key(&self) -> Option<&str> {
        self.kms_key_id
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Credentials for one region
#[derive(Debug, Clone, Deserialize)]
pub struct RegionCredentials {
    /// Access key id
    #[serde(default)]
    pub access_key: String,

    /// Secret access key
    pub secret_key: SecretString,

    /// Optional session token for temporary credentials
    #[serde(default)]
    pub session_token: Option<SecretString>,

    /// Provider API endpoint for the region
    #[serde(default)]
    pub endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const MINIMAL: &str = r#"{
        "ami_configuration": { "description": "BOSH Stemcell" },
        "ami_regions": [
            {
                "name": "us-east-1",
                "bucket_name": "stemcells",
                "credentials": {
                    "access_key": "AKIAEXAMPLE",
                    "secret_key": "s3cr3t",
                    "endpoint": "https://images.us-east-1.example"
                }
            }
        ]
    }"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: RunConfig = serde_json::from_str(MINIMAL).unwrap();

        let image = &config.ami_configuration;
        assert_eq!(image.virtualization_types, vec![VirtualizationType::Hvm]);
        assert_eq!(image.visibility, Visibility::Public);
        assert_eq!(image.architecture, Architecture::X86_64);
        assert!(!image.encrypted);
        assert!(image.tags.is_empty());

        let region = &config.ami_regions[0];
        assert_eq!(region.name, "us-east-1");
        assert!(!region.isolated);
        assert!(region.kms_key_id.is_none());
        assert_eq!(region.credentials.secret_key.expose_secret(), "s3cr3t");
    }

    #[test]
    fn test_isolated_region_flag() {
        let json = r#"{
            "name": "cn-north-1",
            "bucket_name": "stemcells-cn",
            "isolated_region": true,
            "kms_key_id": "arn:aws-cn:kms:cn-north-1:1:key/abc",
            "credentials": { "access_key": "AKIA", "secret_key": "x" }
        }"#;

        let region: RegionConfig = serde_json::from_str(json).unwrap();
        assert!(region.isolated);
        assert_eq!(
            region.kms_key_id.as_deref(),
            Some("arn:aws-cn:kms:cn-north-1:1:key/abc")
        );
    }

    #[test]
    fn test_blank_kms_key_treated_as_unset() {
        let mut config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        let region = &mut config.ami_regions[0];

        region.kms_key_id = Some("   ".to_string());
        assert_eq!(region.kms_key(), None);

        region.kms_key_id = Some(" key/abc ".to_string());
        assert_eq!(region.kms_key(), Some("key/abc"));
    }

    #[test]
    fn test_secret_not_exposed_in_debug() {
        let config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        let debug = format!("{:?}", config.ami_regions[0].credentials);
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_image_name() {
        let mut image: ImageConfiguration =
            serde_json::from_str(r#"{ "description": "d" }"#).unwrap();
        assert_eq!(image.image_name(VirtualizationType::Hvm), "bosh-stemcell-hvm");

        image.name = Some("light-ubuntu-jammy".to_string());
        assert_eq!(
            image.image_name(VirtualizationType::Paravirtual),
            "light-ubuntu-jammy-paravirtual"
        );
    }

    #[test]
    fn test_architecture_serialization() {
        let arch: Architecture = serde_json::from_str(r#""arm64""#).unwrap();
        assert_eq!(arch, Architecture::Arm64);
        assert_eq!(Architecture::X86_64.as_str(), "x86_64");
    }
}
