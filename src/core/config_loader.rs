//! Configuration loader for ami-publisher
//!
//! Reads the JSON run configuration, expands `${VAR}` references from the
//! environment and validates the result. Every problem is reported before
//! any region is dispatched.

use super::config::*;
use crate::core::error::RunError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use tracing::warn;

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    /// Is configuration valid?
    pub valid: bool,

    /// Validation errors
    pub errors: Vec<ConfigValidationError>,

    /// Validation warnings
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "ami_regions[0].bucket_name")
    pub field: String,

    /// Error message
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    /// Field path
    pub field: String,

    /// Warning message
    pub message: String,
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load, expand and validate a run configuration
    ///
    /// # Arguments
    ///
    /// * `reader` - JSON configuration source
    /// * `env` - Variables available to `${VAR}` expansion
    pub fn load<R: Read>(reader: R, env: &HashMap<String, String>) -> Result<RunConfig, RunError> {
        let raw: serde_json::Value = serde_json::from_reader(reader)
            .map_err(|e| RunError::Config(format!("failed to parse JSON config: {}", e)))?;

        let expanded = Self::expand_env_vars(raw, env)?;

        let config: RunConfig = serde_json::from_value(expanded)
            .map_err(|e| RunError::Config(format!("invalid config: {}", e)))?;

        let result = Self::validate(&config);
        for warning in &result.warnings {
            warn!(field = %warning.field, "{}", warning.message);
        }

        if !result.valid {
            let messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(RunError::Config(messages.join("; ")));
        }

        Ok(config)
    }

    /// Expand environment variables in every string value
    fn expand_env_vars(
        value: serde_json::Value,
        env: &HashMap<String, String>,
    ) -> Result<serde_json::Value, RunError> {
        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| RunError::Config(format!("invalid expansion pattern: {}", e)))?;

        Self::expand_value(value, env, &env_var_regex)
    }

    fn expand_value(
        value: serde_json::Value,
        env: &HashMap<String, String>,
        env_var_regex: &Regex,
    ) -> Result<serde_json::Value, RunError> {
        use serde_json::Value;

        match value {
            Value::String(s) => Ok(Value::String(Self::expand_string(&s, env, env_var_regex)?)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| Self::expand_value(item, env, env_var_regex))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, Self::expand_value(v, env, env_var_regex)?)))
                .collect::<Result<serde_json::Map<_, _>, RunError>>()
                .map(Value::Object),
            other => Ok(other),
        }
    }

    /// Expand environment variables in a single string
    ///
    /// Single pass: substituted values are never expanded again.
    fn expand_string(
        input: &str,
        env: &HashMap<String, String>,
        env_var_regex: &Regex,
    ) -> Result<String, RunError> {
        let mut result = String::with_capacity(input.len());
        let mut last = 0;

        for cap in env_var_regex.captures_iter(input) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let value = env.get(name.as_str()).ok_or_else(|| {
                RunError::Config(format!("environment variable {} is not set", name.as_str()))
            })?;

            result.push_str(&input[last..whole.start()]);
            result.push_str(value);
            last = whole.end();
        }
        result.push_str(&input[last..]);

        Ok(result)
    }

    /// Validate configuration
    pub fn validate(config: &RunConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        Self::validate_image_configuration(&config.ami_configuration, &mut errors, &mut warnings);
        Self::validate_regions(config, &mut errors, &mut warnings);

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_image_configuration(
        image: &ImageConfiguration,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if image.description.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "ami_configuration.description".to_string(),
                message: "description is required".to_string(),
            });
        }

        if image.virtualization_types.is_empty() {
            errors.push(ConfigValidationError {
                field: "ami_configuration.virtualization_types".to_string(),
                message: "at least one virtualization type is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for virtualization in &image.virtualization_types {
            if !seen.insert(*virtualization) {
                errors.push(ConfigValidationError {
                    field: "ami_configuration.virtualization_types".to_string(),
                    message: format!("duplicate virtualization type: {}", virtualization),
                });
            }
        }

        if image.encrypted && image.visibility == Visibility::Public {
            errors.push(ConfigValidationError {
                field: "ami_configuration.encrypted".to_string(),
                message: "encrypted images cannot be public".to_string(),
            });
        }

        if image.visibility == Visibility::Public && !image.shared_with_accounts.is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "ami_configuration.shared_with_accounts".to_string(),
                message: "image is public; explicit account sharing has no effect".to_string(),
            });
        }
    }

    fn validate_regions(
        config: &RunConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        let mut names = HashSet::new();

        for (i, region) in config.ami_regions.iter().enumerate() {
            let prefix = format!("ami_regions[{}]", i);

            if region.name.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}.name", prefix),
                    message: "region name is required".to_string(),
                });
            } else if !names.insert(region.name.as_str()) {
                errors.push(ConfigValidationError {
                    field: format!("{}.name", prefix),
                    message: format!("duplicate region: {}", region.name),
                });
            }

            if region.bucket_name.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}.bucket_name", prefix),
                    message: "bucket_name is required".to_string(),
                });
            }

            if region.credentials.access_key.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}.credentials.access_key", prefix),
                    message: "access_key is required".to_string(),
                });
            }

            if secrecy::ExposeSecret::expose_secret(&region.credentials.secret_key)
                .trim()
                .is_empty()
            {
                errors.push(ConfigValidationError {
                    field: format!("{}.credentials.secret_key", prefix),
                    message: "secret_key is required".to_string(),
                });
            }

            if region.isolated
                && config.ami_configuration.encrypted
                && region.kms_key().is_none()
            {
                errors.push(ConfigValidationError {
                    field: format!("{}.kms_key_id", prefix),
                    message: "isolated regions publishing encrypted images need a kms_key_id"
                        .to_string(),
                });
            }

            if !region.isolated && region.kms_key().is_some() {
                warnings.push(ConfigValidationWarning {
                    field: format!("{}.kms_key_id", prefix),
                    message: "kms_key_id is only used by isolated regions".to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_json(name: &str, isolated: bool) -> String {
        format!(
            r#"{{
                "name": "{}",
                "bucket_name": "stemcells",
                "isolated_region": {},
                "credentials": {{
                    "access_key": "AKIAEXAMPLE",
                    "secret_key": "secret",
                    "endpoint": "https://images.example"
                }}
            }}"#,
            name, isolated
        )
    }

    fn config_json(regions: &[String]) -> String {
        format!(
            r#"{{
                "ami_configuration": {{ "description": "BOSH Stemcell" }},
                "ami_regions": [{}]
            }}"#,
            regions.join(",")
        )
    }

    #[test]
    fn test_load_valid_config() {
        let json = config_json(&[
            region_json("us-east-1", false),
            region_json("cn-north-1", false),
        ]);

        let config = ConfigLoader::load(json.as_bytes(), &HashMap::new()).unwrap();
        assert_eq!(config.ami_regions.len(), 2);
        assert_eq!(config.ami_regions[0].name, "us-east-1");
    }

    #[test]
    fn test_load_zero_regions() {
        let json = r#"{ "ami_configuration": { "description": "BOSH Stemcell" } }"#;

        let config = ConfigLoader::load(json.as_bytes(), &HashMap::new()).unwrap();
        assert!(config.ami_regions.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let result = ConfigLoader::load("{ not json".as_bytes(), &HashMap::new());
        assert!(matches!(result, Err(RunError::Config(_))));
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{ "ami_regions": [] }"#;
        let result = ConfigLoader::load(json.as_bytes(), &HashMap::new());

        match result {
            Err(RunError::Config(message)) => assert!(message.contains("ami_configuration")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_expand_env_vars() {
        let json = r#"{
            "ami_configuration": { "description": "Stemcell ${STEMCELL_VERSION}" },
            "ami_regions": [{
                "name": "us-east-1",
                "bucket_name": "stemcells",
                "credentials": {
                    "access_key": "${AWS_ACCESS_KEY_ID}",
                    "secret_key": "${AWS_SECRET_ACCESS_KEY}"
                }
            }]
        }"#;

        let mut env = HashMap::new();
        env.insert("STEMCELL_VERSION".to_string(), "1.42".to_string());
        env.insert("AWS_ACCESS_KEY_ID".to_string(), "AKIAFROMENV".to_string());
        env.insert("AWS_SECRET_ACCESS_KEY".to_string(), "from-env".to_string());

        let config = ConfigLoader::load(json.as_bytes(), &env).unwrap();
        assert_eq!(config.ami_configuration.description, "Stemcell 1.42");
        assert_eq!(config.ami_regions[0].credentials.access_key, "AKIAFROMENV");
        assert_eq!(
            secrecy::ExposeSecret::expose_secret(&config.ami_regions[0].credentials.secret_key),
            "from-env"
        );
    }

    #[test]
    fn test_expanded_values_are_not_expanded_again() {
        let json = r#"{ "ami_configuration": { "description": "${A} ${B}" } }"#;

        let mut env = HashMap::new();
        env.insert("A".to_string(), "literal-${B}".to_string());
        env.insert("B".to_string(), "x".to_string());

        let config = ConfigLoader::load(json.as_bytes(), &env).unwrap();
        assert_eq!(config.ami_configuration.description, "literal-${B} x");
    }

    #[test]
    fn test_repeated_reference_expanded_everywhere() {
        let json = r#"{ "ami_configuration": { "description": "${V}-${V}" } }"#;

        let mut env = HashMap::new();
        env.insert("V".to_string(), "1.42".to_string());

        let config = ConfigLoader::load(json.as_bytes(), &env).unwrap();
        assert_eq!(config.ami_configuration.description, "1.42-1.42");
    }

    #[test]
    fn test_unset_env_var_is_an_error() {
        let json = r#"{ "ami_configuration": { "description": "${MISSING_VAR}" } }"#;
        let result = ConfigLoader::load(json.as_bytes(), &HashMap::new());

        match result {
            Err(RunError::Config(message)) => assert!(message.contains("MISSING_VAR")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let json = config_json(&[
            region_json("us-east-1", false),
            region_json("us-east-1", true),
        ]);
        let config: RunConfig = serde_json::from_str(&json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.message.contains("duplicate region")));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let json = r#"{
            "ami_configuration": { "description": "", "virtualization_types": [] },
            "ami_regions": [{
                "name": "",
                "credentials": { "access_key": "", "secret_key": "" }
            }]
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"ami_configuration.description"));
        assert!(fields.contains(&"ami_configuration.virtualization_types"));
        assert!(fields.contains(&"ami_regions[0].name"));
        assert!(fields.contains(&"ami_regions[0].bucket_name"));
        assert!(fields.contains(&"ami_regions[0].credentials.access_key"));
        assert!(fields.contains(&"ami_regions[0].credentials.secret_key"));
    }

    #[test]
    fn test_duplicate_virtualization_type_rejected() {
        let json = r#"{
            "ami_configuration": {
                "description": "d",
                "virtualization_types": ["hvm", "hvm"]
            }
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
    }

    #[test]
    fn test_encrypted_public_image_rejected() {
        let json = r#"{
            "ami_configuration": { "description": "d", "encrypted": true }
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "ami_configuration.encrypted");
    }

    #[test]
    fn test_isolated_encrypted_requires_kms_key() {
        let json = format!(
            r#"{{
                "ami_configuration": {{
                    "description": "d",
                    "encrypted": true,
                    "visibility": "private"
                }},
                "ami_regions": [{}]
            }}"#,
            region_json("cn-north-1", true)
        );
        let config: RunConfig = serde_json::from_str(&json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "ami_regions[0].kms_key_id");
    }

    #[test]
    fn test_isolated_encrypted_blank_kms_key_rejected() {
        let json = r#"{
            "ami_configuration": {
                "description": "d",
                "encrypted": true,
                "visibility": "private"
            },
            "ami_regions": [{
                "name": "cn-north-1",
                "bucket_name": "b",
                "isolated_region": true,
                "kms_key_id": "  ",
                "credentials": { "access_key": "a", "secret_key": "s" }
            }]
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "ami_regions[0].kms_key_id");
    }

    #[test]
    fn test_kms_key_on_standard_region_warns() {
        let json = r#"{
            "ami_configuration": { "description": "d" },
            "ami_regions": [{
                "name": "us-east-1",
                "bucket_name": "b",
                "kms_key_id": "key",
                "credentials": { "access_key": "a", "secret_key": "s" }
            }]
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        let result = ConfigLoader::validate(&config);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
