//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::compute::{ComputeFuture, ComputeService, InstanceHandle, STATE_BUILD, ServerSpec};
use crate::pipeline::Ui;

/// Error returned by [`ScriptedCompute`] when a scripted failure is queued
/// or a script runs dry.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("scripted compute failure: {0}")]
pub struct ScriptedComputeError(pub String);

/// Records a single call made through [`ScriptedCompute`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ComputeCall {
    /// A creation call, with the zone the attempt targeted.
    Create {
        /// Availability zone on the submitted spec.
        zone: String,
    },
    /// A state refresh for the given instance.
    Refresh {
        /// Instance identifier queried.
        id: String,
    },
    /// A delete call.
    Delete {
        /// Instance identifier deleted.
        id: String,
        /// Whether forced deletion was requested.
        forced: bool,
    },
}

#[derive(Debug, Default)]
struct Script {
    creates: VecDeque<Result<InstanceHandle, ScriptedComputeError>>,
    states: VecDeque<Result<String, ScriptedComputeError>>,
    deletes: VecDeque<Result<(), ScriptedComputeError>>,
    calls: Vec<ComputeCall>,
}

/// Scripted compute service returning pre-seeded outcomes in FIFO order.
///
/// Used to drive deterministic provisioning scenarios without a provider.
/// An exhausted queue yields a [`ScriptedComputeError`], so a test that
/// polls more than it scripted fails instead of hanging.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCompute {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCompute {
    /// Creates a service with no queued outcomes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queues a successful creation acknowledging the given instance id.
    pub fn push_create_ok(&self, id: impl Into<String>) {
        self.lock().creates.push_back(Ok(InstanceHandle {
            id: id.into(),
            state: STATE_BUILD.to_owned(),
        }));
    }

    /// Queues a rejected creation.
    pub fn push_create_err(&self, message: impl Into<String>) {
        self.lock()
            .creates
            .push_back(Err(ScriptedComputeError(message.into())));
    }

    /// Queues a state label for the next refresh.
    pub fn push_state(&self, state: impl Into<String>) {
        self.lock().states.push_back(Ok(state.into()));
    }

    /// Queues a refresh failure.
    pub fn push_state_err(&self, message: impl Into<String>) {
        self.lock()
            .states
            .push_back(Err(ScriptedComputeError(message.into())));
    }

    /// Queues a successful delete.
    pub fn push_delete_ok(&self) {
        self.lock().deletes.push_back(Ok(()));
    }

    /// Queues a failing delete.
    pub fn push_delete_err(&self, message: impl Into<String>) {
        self.lock()
            .deletes
            .push_back(Err(ScriptedComputeError(message.into())));
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ComputeCall> {
        self.lock().calls.clone()
    }

    /// Returns the zones of the creation calls made so far, in order.
    #[must_use]
    pub fn create_zones(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ComputeCall::Create { zone } => Some(zone.clone()),
                ComputeCall::Refresh { .. } | ComputeCall::Delete { .. } => None,
            })
            .collect()
    }
}

impl ComputeService for ScriptedCompute {
    type Error = ScriptedComputeError;

    fn create<'a>(
        &'a self,
        spec: &'a ServerSpec,
    ) -> ComputeFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            let mut script = self.lock();
            script.calls.push(ComputeCall::Create {
                zone: spec.availability_zone.clone(),
            });
            script
                .creates
                .pop_front()
                .unwrap_or_else(|| Err(ScriptedComputeError(String::from("no scripted create"))))
        })
    }

    fn refresh_state<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ComputeFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let mut script = self.lock();
            script.calls.push(ComputeCall::Refresh {
                id: handle.id.clone(),
            });
            script
                .states
                .pop_front()
                .unwrap_or_else(|| Err(ScriptedComputeError(String::from("no scripted state"))))
        })
    }

    fn delete<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        forced: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut script = self.lock();
            script.calls.push(ComputeCall::Delete {
                id: handle.id.clone(),
                forced,
            });
            script
                .deletes
                .pop_front()
                .unwrap_or_else(|| Err(ScriptedComputeError(String::from("no scripted delete"))))
        })
    }
}

/// Messaging sink that records everything for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingUi {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

/// One recorded [`Ui`] event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UiEvent {
    /// A progress announcement.
    Say(String),
    /// An informational detail.
    Message(String),
    /// An error report.
    Error(String),
}

impl RecordingUi {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UiEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns all recorded events in order.
    #[must_use]
    pub fn events(&self) -> Vec<UiEvent> {
        self.lock().clone()
    }

    /// Returns the recorded error messages in order.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                UiEvent::Error(text) => Some(text.clone()),
                UiEvent::Say(_) | UiEvent::Message(_) => None,
            })
            .collect()
    }

    /// Returns the recorded progress announcements in order.
    #[must_use]
    pub fn says(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                UiEvent::Say(text) => Some(text.clone()),
                UiEvent::Message(_) | UiEvent::Error(_) => None,
            })
            .collect()
    }
}

impl Ui for RecordingUi {
    fn say(&mut self, message: &str) {
        self.lock().push(UiEvent::Say(message.to_owned()));
    }

    fn message(&mut self, message: &str) {
        self.lock().push(UiEvent::Message(message.to_owned()));
    }

    fn error(&mut self, message: &str) {
        self.lock().push(UiEvent::Error(message.to_owned()));
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
