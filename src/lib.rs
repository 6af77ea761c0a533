//! Two-loop training coordinator.
//!
//! A worker loop owns a [`Trainable`] artifact and drives training, checkpoints and
//! scheduled hooks; a controller loop shows its progress on a [`controller::Surface`]
//! and turns key presses into [`Command`]s. The two only talk through a pair of
//! non-blocking queues and a one-shot readiness signal. [`bootstrap::run`] wires
//! them up and falls back to headless mode when there is no display.

pub mod artifact;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod mock;
pub mod msg;
pub mod ready;
pub mod schedule;
pub mod worker;

pub use artifact::{StepReport, Trainable};
pub use bootstrap::{run, InterruptHandle, Interrupts, Mode, Outcome};
pub use config::{GoalPolicy, HookAction, HookSpec, TrainerConfig};
pub use error::{Result, TrainerErr};
pub use msg::{Command, Event, LossHistory, LossVector, Preview, Progress};
pub use schedule::{Hook, HookContext, HookRequest, Period, Schedule, ScheduledTask};
