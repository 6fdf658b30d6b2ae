//! Generic blocking wait on an external resource's state machine.
//!
//! Callers describe the wait with a [`StateChange`]: which state labels mean
//! "keep waiting", which mean "done", how often to refresh, and how long the
//! safety ceiling is. Any other observed label fails the wait immediately —
//! an unexpected terminal state is not transient, so retrying past it would
//! only hide the failure.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::pipeline::CancelFlag;

/// Description of a wait for an external state transition.
#[derive(Clone, Debug)]
pub struct StateChange<'a> {
    /// Labels to keep waiting on.
    pub pending: &'a [&'a str],
    /// Labels that complete the wait.
    pub target: &'a [&'a str],
    /// Delay between refreshes.
    pub poll_interval: Duration,
    /// Safety ceiling on the total wait.
    pub max_wait: Duration,
    /// Cancellation flag checked between refreshes, when provided.
    pub cancel: Option<&'a CancelFlag>,
}

impl StateChange<'_> {
    fn target_label(&self) -> String {
        self.target.join("|")
    }
}

/// Errors surfaced by [`wait_for_state`].
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// The refresh operation itself failed.
    #[error("failed to refresh state: {0}")]
    Refresh(#[source] E),
    /// A label outside both the pending and target sets was observed.
    #[error("unexpected state '{state}' while waiting for {target}")]
    UnexpectedState {
        /// Label reported by the refresh.
        state: String,
        /// Target set being waited for.
        target: String,
    },
    /// Cancellation was requested before a target state was reached.
    #[error("cancelled while waiting for {target}")]
    Cancelled {
        /// Target set being waited for.
        target: String,
    },
    /// The safety ceiling elapsed without reaching a target state.
    #[error("timed out waiting for {target}")]
    Timeout {
        /// Target set being waited for.
        target: String,
    },
}

/// Polls `refresh` until a target state is observed.
///
/// `refresh` returns the refreshed resource together with its current state
/// label. The wait succeeds only when a target label is observed; a pending
/// label sleeps one interval and retries; any other label or a refresh
/// failure stops the wait at once. Cancellation is observed between polls,
/// so a cancelled wait returns within one poll interval.
///
/// # Errors
///
/// Returns [`WaitError`] on refresh failure, an unexpected state,
/// cancellation, or when the ceiling elapses.
pub async fn wait_for_state<T, E, F, Fut>(
    conf: &StateChange<'_>,
    mut refresh: F,
) -> Result<T, WaitError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(T, String), E>>,
{
    let deadline = Instant::now() + conf.max_wait;

    loop {
        if conf.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(WaitError::Cancelled {
                target: conf.target_label(),
            });
        }

        let (resource, state) = refresh().await.map_err(WaitError::Refresh)?;

        if conf.target.contains(&state.as_str()) {
            return Ok(resource);
        }
        if !conf.pending.contains(&state.as_str()) {
            return Err(WaitError::UnexpectedState {
                state,
                target: conf.target_label(),
            });
        }

        if Instant::now() >= deadline {
            return Err(WaitError::Timeout {
                target: conf.target_label(),
            });
        }
        sleep(conf.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Error, Eq, PartialEq)]
    #[error("refresh failed: {0}")]
    struct FakeError(String);

    fn conf<'a>(pending: &'a [&'a str], target: &'a [&'a str]) -> StateChange<'a> {
        StateChange {
            pending,
            target,
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(250),
            cancel: None,
        }
    }

    fn scripted(
        states: &[&str],
    ) -> impl FnMut() -> std::future::Ready<Result<(u32, String), FakeError>> {
        let queue = Mutex::new(
            states
                .iter()
                .map(|state| (*state).to_owned())
                .collect::<VecDeque<_>>(),
        );
        move || {
            let next = queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .ok_or_else(|| FakeError(String::from("script exhausted")));
            std::future::ready(next.map(|state| (7, state)))
        }
    }

    #[tokio::test]
    async fn reaches_target_through_pending_states() {
        let result = wait_for_state(
            &conf(&["BUILD"], &["ACTIVE"]),
            scripted(&["BUILD", "BUILD", "ACTIVE"]),
        )
        .await;

        assert!(matches!(result, Ok(7)), "unexpected outcome: {result:?}");
    }

    #[tokio::test]
    async fn fails_on_first_unexpected_state() {
        let result = wait_for_state(
            &conf(&["BUILD"], &["ACTIVE"]),
            scripted(&["BUILD", "ERROR", "ACTIVE"]),
        )
        .await;

        assert!(
            matches!(result, Err(WaitError::UnexpectedState { ref state, .. }) if state == "ERROR"),
            "unexpected outcome: {result:?}"
        );
    }

    #[tokio::test]
    async fn surfaces_refresh_failure() {
        let result = wait_for_state(&conf(&["BUILD"], &["ACTIVE"]), scripted(&[])).await;

        assert!(
            matches!(result, Err(WaitError::Refresh(_))),
            "unexpected outcome: {result:?}"
        );
    }

    #[tokio::test]
    async fn times_out_when_state_stays_pending() {
        let wait = StateChange {
            pending: &["BUILD"],
            target: &["ACTIVE"],
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
            cancel: None,
        };
        let result = wait_for_state(&wait, || {
            std::future::ready(Ok::<_, FakeError>(((), String::from("BUILD"))))
        })
        .await;

        assert!(
            matches!(result, Err(WaitError::Timeout { .. })),
            "unexpected outcome: {result:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_returns_before_reporting_success() {
        let flag = CancelFlag::new();
        flag.cancel();
        let wait = StateChange {
            pending: &["BUILD"],
            target: &["ACTIVE"],
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(250),
            cancel: Some(&flag),
        };

        // The script would succeed immediately; cancellation must win.
        let result = wait_for_state(&wait, scripted(&["ACTIVE"])).await;

        assert!(
            matches!(result, Err(WaitError::Cancelled { .. })),
            "unexpected outcome: {result:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_mid_wait_returns_within_one_interval() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        let wait = StateChange {
            pending: &["BUILD"],
            target: &["ACTIVE"],
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_secs(60),
            cancel: Some(&observer),
        };

        let result = wait_for_state(&wait, || {
            flag.cancel();
            std::future::ready(Ok::<_, FakeError>(((), String::from("BUILD"))))
        })
        .await;

        assert!(
            matches!(result, Err(WaitError::Cancelled { .. })),
            "unexpected outcome: {result:?}"
        );
    }
}
