use std::time::Duration;

use crate::msg::{LossVector, Preview};

/// Outcome of a single completed work step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Iteration counter after the step.
    pub iteration: u64,
    /// Wall time the step took.
    pub elapsed: Duration,
}

/// The trainable artifact driven by the worker loop.
///
/// Every call is synchronous and may legitimately block the worker for a while
/// (a checkpoint writing to disk, a slow step). Failures are opaque to the loop:
/// checkpoint-class failures are logged, a failing `perform_step` ends training.
pub trait Trainable: Send {
    fn current_iteration(&self) -> u64;

    /// The iteration at which training stops, if any.
    fn target_iteration(&self) -> Option<u64>;

    /// Whether the artifact already satisfies its stopping criterion.
    fn goal_reached(&self) -> bool {
        self.target_iteration()
            .is_some_and(|target| self.current_iteration() >= target)
    }

    /// Runs one training step.
    fn perform_step(&mut self) -> anyhow::Result<StepReport>;

    /// Append-only history, one loss vector per completed iteration.
    fn loss_history(&self) -> &[LossVector];

    fn checkpoint(&mut self) -> anyhow::Result<()>;

    fn backup_checkpoint(&mut self) -> anyhow::Result<()>;

    /// Releases whatever the artifact holds. Called exactly once, on every exit path.
    fn finalize(&mut self) -> anyhow::Result<()>;

    fn render_previews(&mut self) -> anyhow::Result<Vec<Preview>>;

    /// Single preview shown in debug mode. Defaults to the first regular preview.
    fn render_debug_preview(&mut self) -> anyhow::Result<Preview> {
        let first = self.render_previews()?.into_iter().next();
        let Some(preview) = first else {
            anyhow::bail!("artifact rendered no previews");
        };
        Ok(Preview::new(
            format!("debug: {} (press p to update)", preview.label),
            preview.image,
        ))
    }

    /// Refreshes preview state without learning; used once the goal is reached.
    fn advance_inference_only(&mut self) -> anyhow::Result<()>;
}

impl<T: Trainable + ?Sized> Trainable for Box<T> {
    fn current_iteration(&self) -> u64 {
        (**self).current_iteration()
    }

    fn target_iteration(&self) -> Option<u64> {
        (**self).target_iteration()
    }

    fn goal_reached(&self) -> bool {
        (**self).goal_reached()
    }

    fn perform_step(&mut self) -> anyhow::Result<StepReport> {
        (**self).perform_step()
    }

    fn loss_history(&self) -> &[LossVector] {
        (**self).loss_history()
    }

    fn checkpoint(&mut self) -> anyhow::Result<()> {
        (**self).checkpoint()
    }

    fn backup_checkpoint(&mut self) -> anyhow::Result<()> {
        (**self).backup_checkpoint()
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        (**self).finalize()
    }

    fn render_previews(&mut self) -> anyhow::Result<Vec<Preview>> {
        (**self).render_previews()
    }

    fn render_debug_preview(&mut self) -> anyhow::Result<Preview> {
        (**self).render_debug_preview()
    }

    fn advance_inference_only(&mut self) -> anyhow::Result<()> {
        (**self).advance_inference_only()
    }
}
