//! Error handling for AMI publishing
//!
//! Errors are split by scope: [`DriverError`] is raised by a driver-set
//! primitive, [`PublishError`] is a driver error (or construction failure)
//! tagged with the region it happened in, and [`RunError`] aborts the whole
//! run before or after the region fan-out.

use crate::core::state_machine::InvalidTransition;
use crate::core::traits::{DriverVariant, WorkflowStep};
use thiserror::Error;

/// Error raised by a single driver-set primitive
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid provider endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("{capability} is not supported by the {variant} driver set")]
    Unsupported {
        capability: &'static str,
        variant: DriverVariant,
    },

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Whether repeating the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Region-scoped publish failure
///
/// Exactly one of these (or a successful record set) is collected per
/// dispatched region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Error publishing AMIs to {region}: could not construct driver set: {message}")]
    DriverConstruction { region: String, message: String },

    #[error("Error publishing AMIs to {region}: {step} failed: {message}")]
    WorkflowStep {
        region: String,
        step: WorkflowStep,
        message: String,
    },

    #[error("Error publishing AMIs to {region}: cancelled after a sibling region failed")]
    Cancelled { region: String },
}

impl PublishError {
    /// Tag a driver error that happened during `step` with its region
    pub fn step(region: &str, step: WorkflowStep, error: DriverError) -> Self {
        Self::WorkflowStep {
            region: region.to_string(),
            step,
            message: error.to_string(),
        }
    }

    /// Get the region identifier associated with this error
    pub fn region(&self) -> &str {
        match self {
            Self::DriverConstruction { region, .. }
            | Self::WorkflowStep { region, .. }
            | Self::Cancelled { region } => region,
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::DriverConstruction { .. } => "DRIVER_CONSTRUCTION_FAILED",
            Self::WorkflowStep { .. } => "WORKFLOW_STEP_FAILED",
            Self::Cancelled { .. } => "CANCELLED",
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::DriverConstruction { .. } => vec![
                "Check the region's access key and secret key",
                "Check that the region endpoint is a valid URL",
            ],
            Self::WorkflowStep {
                step: WorkflowStep::Transfer,
                ..
            } => vec![
                "Check that the bucket exists and is writable with these credentials",
                "Check that the machine image is readable",
            ],
            Self::WorkflowStep {
                step: WorkflowStep::CrossPartitionCopy,
                ..
            } => vec!["Check the region's kms_key_id and its key policy"],
            Self::WorkflowStep { .. } => vec![
                "Check the provider's error message",
                "Already published regions are not rolled back; clean them up if needed",
            ],
            Self::Cancelled { .. } => vec!["Re-run without --fail-fast to see this region's outcome"],
        }
    }
}

/// Run-scoped error; aborts the run as a whole
#[derive(Error, Debug)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("machine image not found at: {0}")]
    SourceImage(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("publishing failed in {} region(s):\n{}", .errors.len(), format_errors(.errors))]
    RegionsFailed { errors: Vec<PublishError> },

    #[error("{recorded} outcome(s) recorded for {expected} dispatched region(s)")]
    AggregationViolation { expected: usize, recorded: usize },

    #[error(transparent)]
    State(#[from] InvalidTransition),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_errors(errors: &[PublishError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
