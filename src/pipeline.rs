//! Pipeline boundary the provision step plugs into.
//!
//! A bake is a sequence of steps sharing one [`BuildContext`]. The context
//! replaces a stringly-keyed state bag with typed fields: earlier steps
//! publish what later steps consume, and the driver reads the stored error
//! when a step halts. Steps report progress through a [`Ui`] sink rather
//! than writing to stdout directly.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::compute::InstanceHandle;

/// Cooperative cancellation flag shared between the driver, steps, and any
/// signal handler task. Cloning shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Steps and waits observe it between polls.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// User-facing messaging sink.
///
/// `say` announces progress, `message` reports a detail worth keeping (for
/// example the instance identifier), and `error` reports a failure. No
/// failure path is silent: every error is rendered through this sink.
pub trait Ui {
    /// Announces a progress update.
    fn say(&mut self, message: &str);
    /// Reports an informational detail.
    fn message(&mut self, message: &str);
    /// Reports an error.
    fn error(&mut self, message: &str);
}

/// [`Ui`] implementation over a pair of writers.
#[derive(Debug)]
pub struct WriteUi<O, E> {
    out: O,
    err: E,
}

impl<O: Write, E: Write> WriteUi<O, E> {
    /// Creates a sink writing progress to `out` and errors to `err`.
    #[must_use]
    pub const fn new(out: O, err: E) -> Self {
        Self { out, err }
    }
}

impl<O: Write, E: Write> Ui for WriteUi<O, E> {
    fn say(&mut self, message: &str) {
        writeln!(self.out, "==> {message}").ok();
    }

    fn message(&mut self, message: &str) {
        writeln!(self.out, "    {message}").ok();
    }

    fn error(&mut self, message: &str) {
        writeln!(self.err, "error: {message}").ok();
    }
}

/// Error stored in the context when a step halts the pipeline.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared state threaded through every step of a bake.
///
/// Inputs (flavor, image, volume, zone candidates) are seeded by the driver
/// or produced by earlier steps; the provision step is the only writer of
/// [`server`](Self::server).
#[derive(Debug, Default)]
pub struct BuildContext {
    /// Flavor reference chosen for the build instance.
    pub flavor_id: String,
    /// Image reference the instance boots from (unless volume-backed).
    pub image_id: String,
    /// Pre-provisioned boot volume, when an earlier step created one.
    pub volume_id: Option<String>,
    /// Candidate availability zones in preference order.
    pub availability_zones: Vec<String>,
    /// Handle of the created instance, published once acknowledged.
    pub server: Option<InstanceHandle>,
    /// Error stored by a halting step for the driver to report.
    pub error: Option<StepError>,
    /// Cancellation flag observed by steps and waits.
    pub cancel: CancelFlag,
}

impl BuildContext {
    /// Stores the error a halting step wants the driver to report.
    pub fn fail(&mut self, error: impl Into<StepError>) {
        self.error = Some(error.into());
    }
}

/// Outcome of running a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop the pipeline; the step stored its error in the context.
    Halt,
}

/// Future returned by [`Step::run`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepAction> + Send + 'a>>;
/// Future returned by [`Step::cleanup`].
pub type CleanupFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// One stage of a bake.
///
/// `cleanup` runs for every step whose `run` was invoked, in reverse order,
/// regardless of how the pipeline ended. Cleanup failures are reported
/// through the sink but never propagate: there is no caller left to
/// escalate to.
pub trait Step {
    /// Performs the step's work.
    fn run<'a>(
        &'a mut self,
        ctx: &'a mut BuildContext,
        ui: &'a mut (dyn Ui + Send),
    ) -> StepFuture<'a>;

    /// Releases whatever the step provisioned, best-effort.
    fn cleanup<'a>(
        &'a mut self,
        ctx: &'a mut BuildContext,
        ui: &'a mut (dyn Ui + Send),
    ) -> CleanupFuture<'a>;
}

/// Runs steps in order, then cleans up the executed prefix in reverse.
///
/// Execution stops at the first [`StepAction::Halt`] or once cancellation
/// is requested; cleanup still covers every step that ran.
pub async fn run_pipeline(
    steps: &mut [Box<dyn Step + Send>],
    ctx: &mut BuildContext,
    ui: &mut (dyn Ui + Send),
) -> StepAction {
    let mut outcome = StepAction::Continue;
    let mut executed = 0;

    for step in steps.iter_mut() {
        if ctx.cancel.is_cancelled() {
            outcome = StepAction::Halt;
            break;
        }
        executed += 1;
        if step.run(ctx, ui).await == StepAction::Halt {
            outcome = StepAction::Halt;
            break;
        }
    }

    for step in steps.iter_mut().take(executed).rev() {
        step.cleanup(ctx, ui).await;
    }

    outcome
}
