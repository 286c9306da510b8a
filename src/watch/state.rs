// ABOUTME: Rollout states and the pure convergence tracker behind the watcher.
// ABOUTME: Classifies each status snapshot against what earlier polls observed.

use serde::Serialize;

use crate::control_plane::DeploymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    /// No task of the new revision is running yet.
    Pending,
    Converging,
    /// Progress went backwards or tasks are running unhealthy.
    Degraded,
    Stable,
    TimedOut,
    RolledBack,
}

impl WatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WatchState::Stable | WatchState::TimedOut | WatchState::RolledBack
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WatchState::Pending => "pending",
            WatchState::Converging => "converging",
            WatchState::Degraded => "degraded",
            WatchState::Stable => "stable",
            WatchState::TimedOut => "timed_out",
            WatchState::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remembers peaks across polls so a single snapshot can be judged in context.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    state: WatchState,
    peak_running: u32,
    min_previous: Option<u32>,
}

impl Default for ConvergenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvergenceTracker {
    pub fn new() -> Self {
        Self {
            state: WatchState::Pending,
            peak_running: 0,
            min_previous: None,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Classify `status` and return the new state.
    ///
    /// Terminal states are sticky.
    pub fn observe(&mut self, status: &DeploymentStatus) -> WatchState {
        if self.state.is_terminal() {
            return self.state;
        }

        let next = if status.rolled_back || self.reverting(status) {
            WatchState::RolledBack
        } else if status.converged() {
            WatchState::Stable
        } else if status.running_count < self.peak_running
            || status.healthy_count < status.running_count
        {
            WatchState::Degraded
        } else if status.running_count == 0 && self.peak_running == 0 {
            WatchState::Pending
        } else {
            WatchState::Converging
        };

        self.peak_running = self.peak_running.max(status.running_count);
        self.min_previous = Some(match self.min_previous {
            Some(min) => min.min(status.previous_running_count),
            None => status.previous_running_count,
        });
        self.state = next;
        next
    }

    /// The deadline passed before the rollout settled.
    pub fn time_out(&mut self) -> WatchState {
        if !self.state.is_terminal() {
            self.state = WatchState::TimedOut;
        }
        self.state
    }

    // New tasks disappearing while old ones come back.
    fn reverting(&self, status: &DeploymentStatus) -> bool {
        let Some(min_previous) = self.min_previous else {
            return false;
        };
        self.peak_running > 0
            && status.running_count < self.peak_running
            && status.previous_running_count > min_previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(running: u32, healthy: u32, previous: u32) -> DeploymentStatus {
        DeploymentStatus::counts(2, running, healthy).with_previous(previous)
    }

    #[test]
    fn normal_rollout_reaches_stable() {
        let mut tracker = ConvergenceTracker::new();
        assert_eq!(tracker.observe(&status(0, 0, 2)), WatchState::Pending);
        assert_eq!(tracker.observe(&status(1, 1, 2)), WatchState::Converging);
        assert_eq!(tracker.observe(&status(2, 2, 2)), WatchState::Stable);
    }

    #[test]
    fn unhealthy_running_tasks_degrade_then_recover() {
        let mut tracker = ConvergenceTracker::new();
        assert_eq!(tracker.observe(&status(2, 1, 0)), WatchState::Degraded);
        assert_eq!(tracker.observe(&status(2, 2, 0)), WatchState::Stable);
    }

    #[test]
    fn losing_tasks_without_old_ones_returning_is_degraded() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(&status(1, 1, 2));
        assert_eq!(tracker.observe(&status(0, 0, 2)), WatchState::Degraded);
        assert_eq!(tracker.observe(&status(1, 1, 2)), WatchState::Converging);
    }

    #[test]
    fn old_revision_coming_back_is_a_rollback() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(&status(1, 1, 1));
        assert_eq!(tracker.observe(&status(0, 0, 2)), WatchState::RolledBack);
    }

    #[test]
    fn control_plane_rollback_flag_wins() {
        let mut tracker = ConvergenceTracker::new();
        let mut reported = status(2, 2, 0);
        reported.rolled_back = true;
        assert_eq!(tracker.observe(&reported), WatchState::RolledBack);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(&status(2, 2, 0));
        assert_eq!(tracker.observe(&status(0, 0, 2)), WatchState::Stable);
        assert_eq!(tracker.time_out(), WatchState::Stable);
    }

    #[test]
    fn time_out_from_converging() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(&status(1, 1, 0));
        assert_eq!(tracker.time_out(), WatchState::TimedOut);
    }
}
