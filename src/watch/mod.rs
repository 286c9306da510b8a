// ABOUTME: Stability watcher that polls the control plane until a rollout settles.
// ABOUTME: Bounded by an overall timeout and interruptible through a cancellation token.

mod state;

pub use state::{ConvergenceTracker, WatchState};

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::control_plane::{ControlPlane, DeploymentStatus};
use crate::types::DeploymentHandle;

/// Polling bounds for one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Overall deadline measured from the first poll.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each interval.
    pub jitter: Duration,
    /// Consecutive failed polls tolerated before giving up.
    pub max_poll_failures: u32,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(15),
            jitter: Duration::from_secs(1),
            max_poll_failures: 3,
        }
    }
}

/// A rollout that converged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stable {
    pub status: DeploymentStatus,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Why a watch ended without a stable rollout. Every variant records how
/// many polls were made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    #[error("service did not stabilize within {}s{}", .elapsed.as_secs(), last_seen(.last.as_ref()))]
    TimedOut {
        elapsed: Duration,
        polls: u32,
        last: Option<DeploymentStatus>,
    },

    #[error("deployment was rolled back ({last})")]
    RolledBack { polls: u32, last: DeploymentStatus },

    #[error("control plane unavailable while watching: {message}")]
    ControlPlaneUnavailable { polls: u32, message: String },

    #[error("deployment stopped making progress ({last})")]
    Stalled { polls: u32, last: DeploymentStatus },

    #[error("watch cancelled")]
    Cancelled { polls: u32 },
}

fn last_seen(last: Option<&DeploymentStatus>) -> String {
    last.map(|s| format!(" (last: {})", s)).unwrap_or_default()
}

impl WatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            WatchError::TimedOut { .. } => "timed_out",
            WatchError::RolledBack { .. } => "rolled_back",
            WatchError::ControlPlaneUnavailable { .. } => "control_plane_unavailable",
            WatchError::Stalled { .. } => "stalled",
            WatchError::Cancelled { .. } => "cancelled",
        }
    }

    /// Status polls that completed before the watch gave up.
    pub fn polls(&self) -> u32 {
        match self {
            WatchError::TimedOut { polls, .. }
            | WatchError::RolledBack { polls, .. }
            | WatchError::ControlPlaneUnavailable { polls, .. }
            | WatchError::Stalled { polls, .. }
            | WatchError::Cancelled { polls } => *polls,
        }
    }

    /// Last status seen before the watch gave up, when there was one.
    pub fn last_status(&self) -> Option<&DeploymentStatus> {
        match self {
            WatchError::TimedOut { last, .. } => last.as_ref(),
            WatchError::RolledBack { last, .. } | WatchError::Stalled { last, .. } => Some(last),
            WatchError::ControlPlaneUnavailable { .. } | WatchError::Cancelled { .. } => None,
        }
    }
}

/// Poll `handle` until it is stable, rolled back, stalled, or out of time.
///
/// The timeout also bounds a poll still in flight. Never submits or changes
/// anything; it only reads status.
pub async fn watch<C>(
    control_plane: &C,
    handle: &DeploymentHandle,
    options: &WatchOptions,
    cancel: &CancellationToken,
) -> Result<Stable, WatchError>
where
    C: ControlPlane + ?Sized,
{
    let started = Instant::now();
    let deadline = started + options.timeout;
    let max_failures = options.max_poll_failures.max(1);

    let mut tracker = ConvergenceTracker::new();
    let mut last: Option<DeploymentStatus> = None;
    let mut polls: u32 = 0;
    let mut failures: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WatchError::Cancelled { polls }),
            result = control_plane.get_status(handle) => result,
            _ = tokio::time::sleep_until(deadline) => {
                tracker.time_out();
                tracing::info!(handle = %handle, polls, "deadline reached during poll");
                return Err(WatchError::TimedOut {
                    elapsed: started.elapsed(),
                    polls,
                    last,
                });
            }
        };
        polls += 1;

        match result {
            Ok(status) => {
                failures = 0;
                let before = tracker.state();
                let state = tracker.observe(&status);
                tracing::debug!(handle = %handle, poll = polls, state = %state, "{}", status);
                if state != before {
                    tracing::info!(handle = %handle, from = %before, to = %state, "{}", status);
                }

                match state {
                    WatchState::Stable => {
                        return Ok(Stable {
                            status,
                            polls,
                            elapsed: started.elapsed(),
                        });
                    }
                    WatchState::RolledBack => {
                        return Err(WatchError::RolledBack {
                            polls,
                            last: status,
                        });
                    }
                    _ if status.terminal => {
                        return Err(WatchError::Stalled {
                            polls,
                            last: status,
                        });
                    }
                    _ => last = Some(status),
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    handle = %handle,
                    poll = polls,
                    failures,
                    "status poll failed: {}",
                    e
                );
                if failures >= max_failures {
                    return Err(WatchError::ControlPlaneUnavailable {
                        polls,
                        message: e.to_string(),
                    });
                }
            }
        }

        let next = Instant::now() + options.poll_interval + jitter(options.jitter);
        if next >= deadline {
            tracker.time_out();
            tracing::info!(handle = %handle, polls, "deadline reached");
            return Err(WatchError::TimedOut {
                elapsed: started.elapsed(),
                polls,
                last,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WatchError::Cancelled { polls }),
            _ = tokio::time::sleep_until(next) => {}
        }
    }
}

/// Uniform random delay in `[0, max]`.
fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
}
