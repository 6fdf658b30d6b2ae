//! Provision step: create the build instance and tear it down afterward.
//!
//! The step assembles one composite creation request, walks the
//! availability-zone candidates in order until an attempt succeeds, waits
//! for the instance to report ready, and publishes the handle for
//! downstream steps. Cleanup deletes the instance and waits for the
//! provider to confirm, best-effort.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

mod options;
pub mod user_data;
mod zones;

pub use options::OptionsError;
pub use user_data::UserDataError;

use crate::compute::{
    ComputeService, DELETION_PENDING_STATES, InstanceHandle, STATE_ACTIVE, STATE_BUILD,
    STATE_DELETED, ServerSpec,
};
use crate::config::BuilderConfig;
use crate::pipeline::{BuildContext, CancelFlag, CleanupFuture, Step, StepAction, StepFuture, Ui};
use crate::poll::{self, StateChange, WaitError};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_STATE_WAIT: Duration = Duration::from_secs(1800);

/// Errors surfaced while provisioning the build instance.
#[derive(Debug, Error)]
pub enum ProvisionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the configured user data cannot be resolved.
    #[error("invalid user data: {0}")]
    UserData(#[from] UserDataError),
    /// Raised when the creation request cannot be assembled.
    #[error("invalid creation request: {0}")]
    Request(#[from] OptionsError),
    /// Raised when the provider rejects a creation attempt.
    #[error("failed to launch server in zone '{zone}': {source}")]
    Create {
        /// Zone of the failed attempt.
        zone: String,
        /// Provider error for the attempt.
        #[source]
        source: E,
    },
    /// Raised when the created instance does not reach the ready state.
    #[error("server {instance_id} did not become ready: {message}")]
    WaitReady {
        /// Provider instance identifier.
        instance_id: String,
        /// Failure description, including a teardown note when the
        /// follow-up delete also failed.
        message: String,
        /// Underlying wait failure.
        #[source]
        source: WaitError<E>,
    },
    /// Raised when the candidate zone list is empty.
    #[error("no availability zone candidates to attempt")]
    NoZoneCandidates,
}

/// Pipeline step that provisions the source instance for an image bake.
#[derive(Debug)]
pub struct ProvisionStep<C> {
    compute: C,
    name: String,
    security_groups: Vec<String>,
    networks: Vec<String>,
    ports: Vec<String>,
    availability_zone: String,
    user_data: String,
    user_data_file: Option<String>,
    config_drive: bool,
    instance_metadata: BTreeMap<String, String>,
    use_block_storage_volume: bool,
    force_delete: bool,
    key_pair_name: String,
    poll_interval: Duration,
    max_state_wait: Duration,
    server: Option<InstanceHandle>,
}

impl<C> ProvisionStep<C>
where
    C: ComputeService,
{
    /// Creates a step from configuration. An empty configured instance name
    /// gets a generated `imago-{uuid}` name so parallel bakes never collide.
    #[must_use]
    pub fn new(compute: C, config: &BuilderConfig) -> Self {
        let name = if config.instance_name.is_empty() {
            format!("imago-{}", Uuid::new_v4().simple())
        } else {
            config.instance_name.clone()
        };
        Self {
            compute,
            name,
            security_groups: config.security_groups.clone(),
            networks: config.networks.clone(),
            ports: config.ports.clone(),
            availability_zone: config.availability_zone.clone(),
            user_data: config.user_data.clone(),
            user_data_file: config.user_data_file.clone(),
            config_drive: config.config_drive,
            instance_metadata: config.instance_metadata.clone(),
            use_block_storage_volume: config.use_block_storage_volume,
            force_delete: config.force_delete,
            key_pair_name: config.ssh_keypair_name.clone(),
            poll_interval: POLL_INTERVAL,
            max_state_wait: MAX_STATE_WAIT,
            server: None,
        }
    }

    /// Overrides the state poll interval.
    ///
    /// This is primarily used by tests to keep wait scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the state wait ceiling.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_max_state_wait(mut self, ceiling: Duration) -> Self {
        self.max_state_wait = ceiling;
        self
    }

    /// Returns the handle of the instance this step created, if any.
    #[must_use]
    pub const fn server(&self) -> Option<&InstanceHandle> {
        self.server.as_ref()
    }

    async fn provision(
        &self,
        ctx: &BuildContext,
        ui: &mut (dyn Ui + Send),
    ) -> Result<InstanceHandle, ProvisionError<C::Error>> {
        let user_data =
            user_data::resolve_user_data(&self.user_data, self.user_data_file.as_deref())?;
        let mut spec = options::build_server_spec(options::SpecInputs {
            name: &self.name,
            flavor_ref: &ctx.flavor_id,
            image_ref: &ctx.image_id,
            security_groups: &self.security_groups,
            ports: &self.ports,
            networks: &self.networks,
            user_data,
            config_drive: self.config_drive,
            metadata: &self.instance_metadata,
            use_block_storage_volume: self.use_block_storage_volume,
            volume_id: ctx.volume_id.as_deref(),
            key_pair_name: &self.key_pair_name,
        })?;

        let mut candidates = ctx.availability_zones.clone();
        if candidates.is_empty() {
            // No candidate list: a single attempt in the preferred zone. An
            // empty preferred zone lets the provider place the instance.
            candidates.push(self.availability_zone.clone());
        }
        zones::promote_preferred(&mut candidates, &self.availability_zone);

        let mut last_error = None;
        for zone in &candidates {
            ui.say(&format!("Launching server in availability zone '{zone}'..."));
            spec.availability_zone = zone.clone();
            match self.create_and_wait(&spec, &ctx.cancel, ui).await {
                Ok(handle) => return Ok(handle),
                Err(err) => {
                    ui.error(&err.to_string());
                    last_error = Some(err);
                }
            }
        }

        // The candidate list always has at least one entry, so an exhausted
        // loop recorded an error for the final zone.
        Err(last_error.unwrap_or(ProvisionError::NoZoneCandidates))
    }

    async fn create_and_wait(
        &self,
        spec: &ServerSpec,
        cancel: &CancelFlag,
        ui: &mut (dyn Ui + Send),
    ) -> Result<InstanceHandle, ProvisionError<C::Error>> {
        let handle =
            self.compute
                .create(spec)
                .await
                .map_err(|source| ProvisionError::Create {
                    zone: spec.availability_zone.clone(),
                    source,
                })?;

        ui.message(&format!("Server ID: {}", handle.id));
        ui.say("Waiting for server to become ready...");

        let wait = StateChange {
            pending: &[STATE_BUILD],
            target: &[STATE_ACTIVE],
            poll_interval: self.poll_interval,
            max_wait: self.max_state_wait,
            cancel: Some(cancel),
        };
        match self.wait_for(&wait, &handle).await {
            Ok(ready) => Ok(ready),
            Err(err) => {
                // Delete the half-provisioned instance so a failed zone
                // attempt leaves nothing behind.
                let message = self.delete_with_note(&handle, &err).await;
                Err(ProvisionError::WaitReady {
                    instance_id: handle.id,
                    message,
                    source: err,
                })
            }
        }
    }

    async fn wait_for(
        &self,
        wait: &StateChange<'_>,
        handle: &InstanceHandle,
    ) -> Result<InstanceHandle, WaitError<C::Error>> {
        let compute = &self.compute;
        let snapshot = handle.clone();
        poll::wait_for_state(wait, move || {
            let refreshed = snapshot.clone();
            async move {
                let state = compute.refresh_state(&refreshed).await?;
                Ok::<_, C::Error>((
                    InstanceHandle {
                        state: state.clone(),
                        ..refreshed
                    },
                    state,
                ))
            }
        })
        .await
    }

    async fn delete_with_note<D: Display>(&self, handle: &InstanceHandle, error: &D) -> String {
        let teardown_error = self
            .compute
            .delete(handle, self.force_delete)
            .await
            .err();
        append_teardown_note(error.to_string(), teardown_error.as_ref())
    }

    async fn terminate(&mut self, ui: &mut (dyn Ui + Send)) {
        let Some(handle) = self.server.clone() else {
            return;
        };

        ui.say(&format!("Terminating the build server: {} ...", handle.id));
        if let Err(err) = self.compute.delete(&handle, self.force_delete).await {
            ui.error(&format!("Error terminating server, may still be around: {err}"));
            return;
        }

        let wait = StateChange {
            pending: DELETION_PENDING_STATES,
            target: &[STATE_DELETED],
            poll_interval: self.poll_interval,
            max_wait: self.max_state_wait,
            // Teardown runs to completion even when the pipeline was
            // aborted, so no cancellation flag here.
            cancel: None,
        };
        match self.wait_for(&wait, &handle).await {
            Ok(_) => {
                self.server = None;
            }
            Err(err) => ui.error(&format!(
                "Error waiting for server {} to be destroyed: {err}",
                handle.id
            )),
        }
    }
}

impl<C> Step for ProvisionStep<C>
where
    C: ComputeService + Send + Sync,
{
    fn run<'a>(
        &'a mut self,
        ctx: &'a mut BuildContext,
        ui: &'a mut (dyn Ui + Send),
    ) -> StepFuture<'a> {
        Box::pin(async move {
            match self.provision(ctx, ui).await {
                Ok(handle) => {
                    self.server = Some(handle.clone());
                    ctx.server = Some(handle);
                    StepAction::Continue
                }
                Err(err) => {
                    ctx.fail(err);
                    StepAction::Halt
                }
            }
        })
    }

    fn cleanup<'a>(
        &'a mut self,
        _ctx: &'a mut BuildContext,
        ui: &'a mut (dyn Ui + Send),
    ) -> CleanupFuture<'a> {
        Box::pin(async move { self.terminate(ui).await })
    }
}

fn append_teardown_note<E: Display>(message: String, teardown_error: Option<&E>) -> String {
    if let Some(teardown) = teardown_error {
        format!("{message} (teardown also failed: {teardown})")
    } else {
        message
    }
}

#[cfg(test)]
mod tests;
