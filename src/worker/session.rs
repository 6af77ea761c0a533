use std::time::{Duration, Instant};

use crate::{config::GoalPolicy, schedule::Cadence};

/// State owned by the worker loop for one training session.
///
/// Nothing in here is ever shared with the controller; it only learns about it
/// through `Progress` events.
#[derive(Debug)]
pub struct Session {
    iteration: u64,
    steps_completed: u64,
    goal_reached: bool,
    checkpoints: Cadence,
    /// Iteration the next average-loss line starts from.
    save_marker: u64,
    /// Set by a checkpoint, consumed by the next step's average-loss line.
    saved_since_marker: bool,
}

impl Session {
    /// Starts a session from the artifact's current state.
    ///
    /// # Args
    /// * `iteration` - The artifact's iteration when the loop starts.
    /// * `goal_reached` - Whether the artifact already satisfies its target.
    /// * `start` - When the loop started.
    /// * `checkpoint_interval` - Periodic checkpoint window.
    pub fn new(iteration: u64, goal_reached: bool, start: Instant, checkpoint_interval: Duration) -> Self {
        Self {
            iteration,
            steps_completed: 0,
            goal_reached,
            checkpoints: Cadence::new(checkpoint_interval, start),
            save_marker: iteration,
            saved_since_marker: false,
        }
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub fn goal_reached(&self) -> bool {
        self.goal_reached
    }

    #[inline]
    pub fn record_step(&mut self, iteration: u64) {
        self.iteration = iteration;
        self.steps_completed += 1;
    }

    pub fn reach_goal(&mut self) {
        self.goal_reached = true;
    }

    /// Whether a checkpoint (save or backup) may run right now.
    ///
    /// Never before the first completed step of this session, and never after the
    /// goal unless the policy explicitly allows it.
    pub fn checkpoint_allowed(&self, policy: GoalPolicy) -> bool {
        if self.steps_completed == 0 {
            return false;
        }
        !(self.goal_reached && policy == GoalPolicy::Suppress)
    }

    pub fn mark_saved(&mut self) {
        self.saved_since_marker = true;
    }

    /// If a checkpoint happened since the last average-loss line, returns the
    /// iteration range to average over and moves the marker to `iteration`.
    pub fn take_average_range(&mut self, iteration: u64) -> Option<(u64, u64)> {
        if !self.saved_since_marker {
            return None;
        }
        self.saved_since_marker = false;
        let range = (self.save_marker, iteration);
        self.save_marker = iteration;
        Some(range)
    }

    /// Whether a periodic checkpoint window elapsed. Missed windows coalesce.
    pub fn periodic_checkpoint_due(&mut self, now: Instant) -> bool {
        self.checkpoints.due(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(iteration: u64, goal: bool) -> Session {
        Session::new(iteration, goal, Instant::now(), Duration::from_secs(60))
    }

    #[test]
    fn no_checkpoint_before_first_step() {
        let mut s = session(5000, false);
        assert!(!s.checkpoint_allowed(GoalPolicy::Suppress));
        assert!(!s.checkpoint_allowed(GoalPolicy::Allow));

        s.record_step(5001);
        assert!(s.checkpoint_allowed(GoalPolicy::Suppress));
    }

    #[test]
    fn goal_policy_gates_checkpoints() {
        let mut s = session(0, false);
        s.record_step(1);
        s.reach_goal();

        assert!(!s.checkpoint_allowed(GoalPolicy::Suppress));
        assert!(s.checkpoint_allowed(GoalPolicy::Allow));
    }

    #[test]
    fn average_range_follows_saves() {
        let mut s = session(10, false);
        assert_eq!(s.take_average_range(11), None);

        s.mark_saved();
        assert_eq!(s.take_average_range(15), Some((10, 15)));
        assert_eq!(s.take_average_range(16), None);

        s.mark_saved();
        assert_eq!(s.take_average_range(20), Some((15, 20)));
    }

    #[test]
    fn periodic_checkpoint_coalesces() {
        let t0 = Instant::now();
        let mut s = Session::new(0, false, t0, Duration::from_secs(60));

        assert!(!s.periodic_checkpoint_due(t0 + Duration::from_secs(59)));
        assert!(s.periodic_checkpoint_due(t0 + Duration::from_secs(200)));
        assert!(!s.periodic_checkpoint_due(t0 + Duration::from_secs(201)));
        assert!(s.periodic_checkpoint_due(t0 + Duration::from_secs(240)));
    }
}
