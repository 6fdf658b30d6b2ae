//! Compute service boundary for provisioning disposable build instances.
//!
//! The provision step talks to the cloud through [`ComputeService`], a small
//! trait covering exactly the operations an image bake needs: create a
//! server, refresh its lifecycle state, and delete it. Providers implement
//! the trait; everything above it stays provider-agnostic.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Lifecycle label reported while an instance is still building.
pub const STATE_BUILD: &str = "BUILD";
/// Lifecycle label for an instance that is ready for use.
pub const STATE_ACTIVE: &str = "ACTIVE";
/// Lifecycle label for an instance the provider no longer tracks.
pub const STATE_DELETED: &str = "DELETED";

/// States a live instance may report while a deletion is in flight.
pub const DELETION_PENDING_STATES: &[&str] = &[
    "ACTIVE", "BUILD", "REBUILD", "SUSPENDED", "SHUTOFF", "STOPPED",
];

/// A single entry in a server's ordered network attachment list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkAttachment {
    /// Attach to a network by identifier; the provider allocates the port.
    Network(String),
    /// Attach a pre-created port by identifier.
    Port(String),
}

/// Root-disk device descriptor for a volume-backed boot.
///
/// The source and destination types are fixed to `volume`: the instance
/// boots from a pre-provisioned block-storage volume and keeps it as the
/// root disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootVolume {
    /// Identifier of the pre-created block-storage volume.
    pub volume_id: String,
    /// Position in the boot order; the root disk is always index 0.
    pub boot_index: u32,
}

impl BootVolume {
    /// Device source type submitted to the provider.
    pub const SOURCE_TYPE: &'static str = "volume";
    /// Device destination type submitted to the provider.
    pub const DESTINATION_TYPE: &'static str = "volume";

    /// Creates a root-disk descriptor for the given volume.
    #[must_use]
    pub fn new(volume_id: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            boot_index: 0,
        }
    }
}

/// Where the instance boots from. Image and volume are mutually exclusive;
/// the provider rejects requests carrying both.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BootSource {
    /// Boot from an image reference.
    Image(String),
    /// Boot from a pre-provisioned block-storage volume.
    Volume(BootVolume),
}

/// Optional additions layered onto a base [`ServerSpec`].
///
/// Options apply in list order to a single mutable spec, so a later option
/// always observes the effect of an earlier one. The canonical order is
/// boot-from-volume first, key pair second.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CreateOption {
    /// Boot from the given volume instead of an image. Clears the spec's
    /// image reference, which the provider rejects alongside a boot device.
    BootFromVolume {
        /// Identifier of the pre-created boot volume.
        volume_id: String,
    },
    /// Inject the named SSH key pair into the instance.
    KeyPair {
        /// Provider-side key pair name.
        name: String,
    },
}

impl CreateOption {
    fn apply(&self, spec: &mut ServerSpec) {
        match self {
            Self::BootFromVolume { volume_id } => {
                spec.image_ref = None;
                spec.boot_volume = Some(BootVolume::new(volume_id.clone()));
            }
            Self::KeyPair { name } => {
                spec.key_name = Some(name.clone());
            }
        }
    }
}

/// Applies creation options to the spec in list order.
pub fn apply_options(spec: &mut ServerSpec, options: &[CreateOption]) {
    for option in options {
        option.apply(spec);
    }
}

/// Composite creation request submitted to [`ComputeService::create`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerSpec {
    /// Server name shown in the provider console.
    pub name: String,
    /// Boot image reference; cleared when a boot volume is attached.
    pub image_ref: Option<String>,
    /// Flavor (size) reference.
    pub flavor_ref: String,
    /// Security group names applied to the instance.
    pub security_groups: Vec<String>,
    /// Ordered network attachments, ports before networks.
    pub networks: Vec<NetworkAttachment>,
    /// Availability zone for this attempt; reassigned per zone attempt.
    pub availability_zone: String,
    /// Free-form user data passed to the instance verbatim.
    pub user_data: Vec<u8>,
    /// Whether to expose metadata through a config drive.
    pub config_drive: bool,
    /// Instance metadata key/value pairs.
    pub metadata: BTreeMap<String, String>,
    /// Root-disk device for volume-backed boots.
    pub boot_volume: Option<BootVolume>,
    /// SSH key pair name to inject, if any.
    pub key_name: Option<String>,
}

impl ServerSpec {
    /// Creates a spec booting from the given image, with everything else
    /// empty. Creation options and per-attempt fields are layered on by the
    /// caller.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        image_ref: impl Into<String>,
        flavor_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image_ref: Some(image_ref.into()),
            flavor_ref: flavor_ref.into(),
            security_groups: Vec::new(),
            networks: Vec::new(),
            availability_zone: String::new(),
            user_data: Vec::new(),
            config_drive: false,
            metadata: BTreeMap::new(),
            boot_volume: None,
            key_name: None,
        }
    }

    /// Returns the boot source this spec resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when the spec carries both an image reference
    /// and a boot volume, or neither.
    pub fn boot_source(&self) -> Result<BootSource, SpecError> {
        match (&self.image_ref, &self.boot_volume) {
            (Some(_), Some(_)) => Err(SpecError::ConflictingBootSource),
            (None, None) => Err(SpecError::MissingBootSource),
            (Some(image), None) => Ok(BootSource::Image(image.clone())),
            (None, Some(volume)) => Ok(BootSource::Volume(volume.clone())),
        }
    }

    /// Validates the spec before submission.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when a required field is empty or the boot
    /// source is not exactly one of image and volume.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::MissingField("name"));
        }
        if self.flavor_ref.is_empty() {
            return Err(SpecError::MissingField("flavor_ref"));
        }
        self.boot_source().map(|_| ())
    }
}

/// Validation errors for a [`ServerSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// A required field is empty.
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    /// Both an image reference and a boot volume are populated.
    #[error("image reference and boot volume are mutually exclusive")]
    ConflictingBootSource,
    /// Neither an image reference nor a boot volume is populated.
    #[error("spec has neither an image reference nor a boot volume")]
    MissingBootSource,
}

/// Handle for an instance the provider has acknowledged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider-assigned instance identifier.
    pub id: String,
    /// Last lifecycle state observed for the instance.
    pub state: String,
}

/// Future returned by compute service operations.
pub type ComputeFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by compute providers.
///
/// Contract: [`refresh_state`](Self::refresh_state) reports an instance the
/// provider no longer knows as [`STATE_DELETED`], not as an error, so
/// teardown waits converge without special-casing.
pub trait ComputeService {
    /// Provider specific error type returned by the service.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submits the creation request and returns a handle once acknowledged.
    fn create<'a>(
        &'a self,
        spec: &'a ServerSpec,
    ) -> ComputeFuture<'a, InstanceHandle, Self::Error>;

    /// Queries the current lifecycle state of the instance.
    fn refresh_state<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ComputeFuture<'a, String, Self::Error>;

    /// Deletes the instance, forcefully when `forced` is set.
    fn delete<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        forced: bool,
    ) -> ComputeFuture<'a, (), Self::Error>;
}
