/// Counters returned by the worker loop when it terminates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerMetrics {
    pub steps: u64,
    pub checkpoints: u64,
    pub backups: u64,
    pub progress_events: u64,
    pub hook_requests: u64,
    /// The loop ended because a step failed rather than on `Close`.
    pub failed: bool,
}

impl WorkerMetrics {
    #[inline]
    pub fn bump_step(&mut self) {
        self.steps += 1;
    }

    #[inline]
    pub fn bump_checkpoint(&mut self) {
        self.checkpoints += 1;
    }

    #[inline]
    pub fn bump_backup(&mut self) {
        self.backups += 1;
    }

    #[inline]
    pub fn bump_progress(&mut self) {
        self.progress_events += 1;
    }

    #[inline]
    pub fn add_hook_requests(&mut self, n: usize) {
        self.hook_requests += n as u64;
    }
}
