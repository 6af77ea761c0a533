use std::{error::Error, fmt, io, time::Duration};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, TrainerErr>;

/// Failures surfaced to whoever started the worker/controller pair.
///
/// Collaborator failures (checkpoints, hooks, rendering) never show up here: they are
/// contained and logged by the loop that invoked them.
#[derive(Debug)]
pub enum TrainerErr {
    Io(io::Error),
    Config(String),
    ReadinessTimeout(Duration),
    StartupFailed(String),
    WorkerPanicked,
    Join(String),
}

impl fmt::Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerErr::Io(e) => write!(f, "io error: {e}"),
            TrainerErr::Config(msg) => write!(f, "invalid config: {msg}"),
            TrainerErr::ReadinessTimeout(waited) => write!(
                f,
                "trainer produced no progress within {:.1}s",
                waited.as_secs_f64()
            ),
            TrainerErr::StartupFailed(msg) => write!(f, "trainer failed to start: {msg}"),
            TrainerErr::WorkerPanicked => write!(f, "trainer thread panicked"),
            TrainerErr::Join(msg) => write!(f, "join error: {msg}"),
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainerErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainerErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainerErr> for io::Error {
    fn from(value: TrainerErr) -> Self {
        match value {
            TrainerErr::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
