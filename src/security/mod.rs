pub mod credential_validator;
pub mod masking;

pub use credential_validator::CredentialValidator;
pub use masking::{SecretScrubber, mask_secret};
