//! Composite creation request assembly.
//!
//! The request is built in two moves: construct the base [`ServerSpec`]
//! from configuration and pipeline inputs, then apply the creation options
//! in their canonical order (boot-from-volume first, key pair second) to
//! that single mutable value. Applying boot-from-volume clears the image
//! reference before attaching the device, so the provider never sees the
//! invalid combination of both.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::compute::{
    BootSource, BootVolume, CreateOption, NetworkAttachment, ServerSpec, SpecError, apply_options,
};

/// Input-validation errors raised while assembling a creation request.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum OptionsError {
    /// Volume-backed boot was requested but no volume id is available.
    #[error("volume-backed boot requested but no volume id is available")]
    MissingVolumeId,
    /// The assembled spec failed validation.
    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Inputs for one composite creation request.
///
/// The availability zone is deliberately absent: the scheduler reassigns it
/// on the finished spec for every attempt.
pub(crate) struct SpecInputs<'a> {
    pub name: &'a str,
    pub flavor_ref: &'a str,
    pub image_ref: &'a str,
    pub security_groups: &'a [String],
    pub ports: &'a [String],
    pub networks: &'a [String],
    pub user_data: Vec<u8>,
    pub config_drive: bool,
    pub metadata: &'a BTreeMap<String, String>,
    pub use_block_storage_volume: bool,
    pub volume_id: Option<&'a str>,
    pub key_pair_name: &'a str,
}

/// Decides whether the instance boots from an image or a volume.
///
/// Pure transformation; when volume-backed boot is requested without a
/// volume id the contradiction is reported here, before any provider call.
///
/// # Errors
///
/// Returns [`OptionsError::MissingVolumeId`] for the contradictory input.
pub(crate) fn resolve_boot_source(
    use_block_storage_volume: bool,
    image_ref: &str,
    volume_id: Option<&str>,
) -> Result<BootSource, OptionsError> {
    if use_block_storage_volume {
        let volume = volume_id.ok_or(OptionsError::MissingVolumeId)?;
        return Ok(BootSource::Volume(BootVolume::new(volume)));
    }
    Ok(BootSource::Image(image_ref.to_owned()))
}

/// Merges port and network identifiers into one ordered attachment list,
/// all ports before all networks, input order preserved within each class.
#[must_use]
pub(crate) fn merge_attachments(ports: &[String], networks: &[String]) -> Vec<NetworkAttachment> {
    let mut attachments = Vec::with_capacity(ports.len() + networks.len());
    attachments.extend(ports.iter().cloned().map(NetworkAttachment::Port));
    attachments.extend(networks.iter().cloned().map(NetworkAttachment::Network));
    attachments
}

/// Builds the composite creation request.
///
/// # Errors
///
/// Returns [`OptionsError`] when the inputs contradict each other or the
/// assembled spec fails validation.
pub(crate) fn build_server_spec(inputs: SpecInputs<'_>) -> Result<ServerSpec, OptionsError> {
    let boot_source = resolve_boot_source(
        inputs.use_block_storage_volume,
        inputs.image_ref,
        inputs.volume_id,
    )?;

    let mut spec = ServerSpec::new(inputs.name, inputs.image_ref, inputs.flavor_ref);
    spec.security_groups = inputs.security_groups.to_vec();
    spec.networks = merge_attachments(inputs.ports, inputs.networks);
    spec.user_data = inputs.user_data;
    spec.config_drive = inputs.config_drive;
    spec.metadata = inputs.metadata.clone();

    let mut options = Vec::new();
    if let BootSource::Volume(volume) = boot_source {
        options.push(CreateOption::BootFromVolume {
            volume_id: volume.volume_id,
        });
    }
    if !inputs.key_pair_name.is_empty() {
        options.push(CreateOption::KeyPair {
            name: inputs.key_pair_name.to_owned(),
        });
    }
    apply_options(&mut spec, &options);

    spec.validate()?;
    Ok(spec)
}
