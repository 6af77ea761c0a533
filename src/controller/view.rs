use crate::msg::{LossHistory, LossVector, Preview, Progress};

/// Everything the controller knows about the worker, rebuilt from `Progress` events.
#[derive(Debug, Clone)]
pub struct ControllerView {
    previews: Vec<Preview>,
    loss_history: LossHistory,
    iteration: u64,
    selected: usize,
    windows: Vec<usize>,
    window_idx: usize,
    preview_in_flight: bool,
    dirty: bool,
}

impl ControllerView {
    /// Creates an empty view.
    ///
    /// # Args
    /// * `windows` - History window sizes to cycle through; `0` means unbounded.
    pub fn new(windows: Vec<usize>) -> Self {
        let windows = if windows.is_empty() { vec![0] } else { windows };

        Self {
            previews: Vec::new(),
            loss_history: Vec::new(),
            iteration: 0,
            selected: 0,
            windows,
            window_idx: 0,
            preview_in_flight: false,
            dirty: false,
        }
    }

    /// Replaces the view with the latest snapshot and clears the in-flight preview request.
    pub fn apply(&mut self, progress: Progress) {
        self.preview_in_flight = false;
        self.previews = progress.previews;
        self.loss_history = progress.loss_history;
        self.iteration = progress.iteration;
        self.selected = if self.previews.is_empty() {
            0
        } else {
            self.selected % self.previews.len()
        };
        self.dirty = true;
    }

    /// Marks a preview request as sent.
    ///
    /// # Returns
    /// `false` if one is already in flight, in which case nothing should be sent.
    pub fn request_preview(&mut self) -> bool {
        if self.preview_in_flight {
            return false;
        }
        self.preview_in_flight = true;
        true
    }

    pub fn preview_in_flight(&self) -> bool {
        self.preview_in_flight
    }

    pub fn select_next(&mut self) {
        if self.previews.is_empty() {
            return;
        }
        self.selected = (self.selected + 1) % self.previews.len();
        self.dirty = true;
    }

    pub fn cycle_history_window(&mut self) {
        self.window_idx = (self.window_idx + 1) % self.windows.len();
        self.dirty = true;
    }

    pub fn history_window(&self) -> usize {
        self.windows[self.window_idx]
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn previews(&self) -> &[Preview] {
        &self.previews
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_preview(&self) -> Option<&Preview> {
        self.previews.get(self.selected)
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The tail of the loss history covered by the current window.
    pub fn windowed_history(&self) -> &[LossVector] {
        let window = self.history_window();
        let len = self.loss_history.len();
        if window == 0 || window >= len {
            &self.loss_history
        } else {
            &self.loss_history[len - window..]
        }
    }
}
