//! Core library for the Imago image-bake provisioner.
//!
//! The crate provisions a single disposable compute instance as one step of
//! an image-building pipeline: assemble the creation request, try
//! availability zones in order until one accepts it, wait for the instance
//! to report ready, and tear it down again during cleanup.

pub mod compute;
pub mod config;
pub mod nova;
pub mod pipeline;
pub mod poll;
pub mod provision;
pub mod test_support;

pub use compute::{
    BootSource, BootVolume, ComputeService, CreateOption, InstanceHandle, NetworkAttachment,
    ServerSpec, SpecError,
};
pub use config::{BuilderConfig, ConfigError};
pub use nova::{NovaCompute, NovaComputeError};
pub use pipeline::{
    BuildContext, CancelFlag, Step, StepAction, Ui, WriteUi, run_pipeline,
};
pub use poll::{StateChange, WaitError, wait_for_state};
pub use provision::{OptionsError, ProvisionError, ProvisionStep, UserDataError};
