use image::RgbImage;

/// One loss value per tracked loss component, for a single iteration.
pub type LossVector = Vec<f32>;

/// Cumulative, append-only loss history: one entry per completed iteration.
pub type LossHistory = Vec<LossVector>;

/// A labelled preview image.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub label: String,
    pub image: RgbImage,
}

impl Preview {
    pub fn new(label: impl Into<String>, image: RgbImage) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}

/// Controller -> worker requests.
///
/// Every command is idempotent: repeating one never corrupts the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Save,
    Backup,
    RequestPreview,
    Close,
}

/// A snapshot of the worker's observable state.
///
/// Everything in here is owned, so the worker keeps mutating its own buffers
/// after emission without racing the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub previews: Vec<Preview>,
    pub iteration: u64,
    pub loss_history: LossHistory,
}

/// Worker -> controller notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress(Progress),
    /// Terminal: no further events follow.
    Closed,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Progress(_) => "progress",
            Event::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds() {
        let progress = Event::Progress(Progress {
            previews: Vec::new(),
            iteration: 3,
            loss_history: vec![vec![0.5]],
        });
        assert_eq!(progress.kind(), "progress");
        assert_eq!(Event::Closed.kind(), "closed");
    }
}
