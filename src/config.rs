//! Configuration loading via `ortho-config`.

use std::collections::BTreeMap;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Builder configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "IMAGO")]
pub struct BuilderConfig {
    /// Base URL of the compute API, for example
    /// `https://compute.example.net/v2.1`.
    pub compute_endpoint: String,
    /// Pre-issued API token sent with every request. Obtaining the token is
    /// the operator's concern; this tool never drives a credential flow.
    pub auth_token: String,
    /// Name for the build instance. Empty means a generated `imago-{uuid}`
    /// name.
    #[ortho_config(default = String::new())]
    pub instance_name: String,
    /// Flavor reference for the build instance.
    pub flavor: String,
    /// Image reference the instance boots from (ignored for volume-backed
    /// boots).
    pub source_image: String,
    /// Security group names applied to the instance.
    #[ortho_config(default = Vec::new())]
    pub security_groups: Vec<String>,
    /// Network identifiers to attach, in order, after any ports.
    #[ortho_config(default = Vec::new())]
    pub networks: Vec<String>,
    /// Pre-created port identifiers to attach, in order, before networks.
    #[ortho_config(default = Vec::new())]
    pub ports: Vec<String>,
    /// Preferred availability zone, tried first when present in the
    /// candidate list. Empty lets the provider place the instance.
    #[ortho_config(default = String::new())]
    pub availability_zone: String,
    /// Candidate availability zones for creation attempts, in order.
    #[ortho_config(default = Vec::new())]
    pub availability_zones: Vec<String>,
    /// Inline user data passed to the instance.
    #[ortho_config(default = String::new())]
    pub user_data: String,
    /// Path to a user-data file; its content overrides `user_data`.
    pub user_data_file: Option<String>,
    /// Whether to expose metadata through a config drive.
    #[ortho_config(default = false)]
    pub config_drive: bool,
    /// Instance metadata key/value pairs.
    #[ortho_config(default = BTreeMap::new(), skip_cli)]
    pub instance_metadata: BTreeMap<String, String>,
    /// Boot from a pre-provisioned block-storage volume instead of the
    /// source image.
    #[ortho_config(default = false)]
    pub use_block_storage_volume: bool,
    /// Identifier of the boot volume. In a full bake an earlier step
    /// computes this; the CLI accepts it from configuration.
    pub volume_id: Option<String>,
    /// Use forced deletion during teardown.
    #[ortho_config(default = false)]
    pub force_delete: bool,
    /// SSH key pair name injected into the instance; empty skips injection.
    #[ortho_config(default = String::new())]
    pub ssh_keypair_name: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl BuilderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to imago.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags
    /// in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("imago")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages
    /// include guidance on how to provide missing values via environment
    /// variables or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// or the configured boot options contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.compute_endpoint,
            &FieldMetadata::new(
                "compute API endpoint",
                "IMAGO_COMPUTE_ENDPOINT",
                "compute_endpoint",
            ),
        )?;
        Self::require_field(
            &self.auth_token,
            &FieldMetadata::new("compute API token", "IMAGO_AUTH_TOKEN", "auth_token"),
        )?;
        Self::require_field(
            &self.flavor,
            &FieldMetadata::new("instance flavor", "IMAGO_FLAVOR", "flavor"),
        )?;
        Self::require_field(
            &self.source_image,
            &FieldMetadata::new("source image", "IMAGO_SOURCE_IMAGE", "source_image"),
        )?;
        if self.use_block_storage_volume {
            let volume = self.volume_id.as_deref().unwrap_or_default();
            Self::require_field(
                volume,
                &FieldMetadata::new("boot volume id", "IMAGO_VOLUME_ID", "volume_id"),
            )?;
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
