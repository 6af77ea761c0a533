//! Starts the worker and the controller, waits for the worker to become observable,
//! and falls back to headless mode when there is no usable display.

use std::{
    future,
    thread::{self, JoinHandle},
    time::Instant,
};

use log::{debug, error, info, warn};
use tokio::{signal, sync::mpsc, task};

use crate::{
    artifact::Trainable,
    channel::{self, CommandSender, EventReceiver},
    config::TrainerConfig,
    controller::{ControllerExit, ControllerLoop, Surface},
    error::{Result, TrainerErr},
    msg::{Command, Event},
    ready::{self, Readiness},
    schedule::{Schedule, ScheduledTask},
    worker::{WorkerLoop, WorkerMetrics},
};

/// Where interrupts (Ctrl-C or an embedding application) come from.
///
/// Each interrupt is turned into a `Close` command; the process is never torn down directly.
#[derive(Debug)]
pub struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Raises interrupts on a manual [`Interrupts`] source.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl InterruptHandle {
    /// # Returns
    /// `false` if the run this handle belongs to is already over.
    pub fn interrupt(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl Interrupts {
    /// Interrupts driven only by the returned handle.
    pub fn manual() -> (InterruptHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InterruptHandle { tx }, Self { rx })
    }

    /// Interrupts raised by the process' Ctrl-C signal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ctrl_c() -> Self {
        let (handle, interrupts) = Self::manual();
        tokio::spawn(async move {
            while signal::ctrl_c().await.is_ok() {
                if !handle.interrupt() {
                    break;
                }
            }
        });
        interrupts
    }

    /// Resolves on the next interrupt. Never resolves once every handle is gone.
    async fn next(&mut self) {
        if self.rx.recv().await.is_none() {
            future::pending::<()>().await;
        }
    }
}

/// How the run was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Headless,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub metrics: WorkerMetrics,
    pub mode: Mode,
}

/// Runs a training session to completion.
///
/// # Args
/// * `artifact` - The trainable artifact, moved onto the worker thread.
/// * `cfg` - Runtime configuration; its declarative hooks are registered first.
/// * `hooks` - Extra scheduled tasks registered after the configured ones.
/// * `surface` - Display for the controller; unused when previews are disabled.
/// * `interrupts` - Source of interrupts, each turned into a `Close` command.
///
/// # Returns
/// The worker's counters and whether the run ended with the preview window.
///
/// # Errors
/// - `TrainerErr::Config` if `cfg` is invalid.
/// - `TrainerErr::Io` if a thread cannot be spawned.
/// - `TrainerErr::ReadinessTimeout` / `TrainerErr::StartupFailed` if the worker never
///   produced progress; these are returned only after the worker has closed.
/// - `TrainerErr::WorkerPanicked` / `TrainerErr::Join` if a thread could not be joined.
pub async fn run<T, S>(
    artifact: T,
    cfg: TrainerConfig,
    hooks: Vec<ScheduledTask>,
    surface: S,
    mut interrupts: Interrupts,
) -> Result<Outcome>
where
    T: Trainable + 'static,
    S: Surface + 'static,
{
    cfg.validate()?;

    let (cmd_tx, cmd_rx) = channel::command_channel();
    let (event_tx, event_rx) = channel::event_channel();
    let (ready_signal, ready_waiter) = ready::readiness();

    let mut schedule = Schedule::new(Instant::now());
    for task in cfg.hooks.iter().map(ScheduledTask::from_spec).chain(hooks) {
        debug!(hook = task.name(); "hook registered");
        schedule.register(task);
    }
    if schedule.is_empty() {
        debug!("no scheduled hooks");
    }

    let worker_cfg = cfg.clone();
    let worker = thread::Builder::new()
        .name("trainer".into())
        .spawn(move || {
            WorkerLoop::new(artifact, &worker_cfg, schedule, cmd_rx, event_tx, ready_signal).run()
        })?;

    let startup_err = match ready_waiter.wait(cfg.readiness_timeout()).await {
        Ok(Readiness::Ready) => None,
        Ok(Readiness::GaveUp) => {
            error!("trainer exited before producing any progress");
            Some(TrainerErr::StartupFailed(
                "worker closed before its first progress event".into(),
            ))
        }
        Err(e) => {
            error!("{e}, continuing without preview");
            Some(e)
        }
    };

    let mut mode = Mode::Headless;
    let events = if startup_err.is_none() && !cfg.no_preview {
        match preview(surface, event_rx, &cmd_tx, &cfg, &mut interrupts).await? {
            Some(events) => Some(events),
            None => {
                mode = Mode::Preview;
                None
            }
        }
    } else {
        Some(event_rx)
    };

    if let Some(events) = events {
        headless(events, &cmd_tx, &mut interrupts).await;
    }

    let metrics = match task::spawn_blocking(move || join(worker)).await {
        Ok(res) => res?,
        Err(e) => return Err(TrainerErr::Join(e.to_string())),
    };

    info!(
        steps = metrics.steps,
        checkpoints = metrics.checkpoints;
        "training session over"
    );

    match startup_err {
        Some(e) => Err(e),
        None => Ok(Outcome { metrics, mode }),
    }
}

/// Runs the controller on its own thread until it closes or degrades.
///
/// # Returns
/// `None` if the controller saw `Closed`, otherwise the event queue to keep watching.
async fn preview<S: Surface + 'static>(
    surface: S,
    events: EventReceiver,
    commands: &CommandSender,
    cfg: &TrainerConfig,
    interrupts: &mut Interrupts,
) -> Result<Option<EventReceiver>> {
    let controller = ControllerLoop::new(surface, events, commands.clone(), cfg);
    let handle = thread::Builder::new()
        .name("preview".into())
        .spawn(move || controller.run())?;

    let mut joined = task::spawn_blocking(move || handle.join());
    let joined = loop {
        tokio::select! {
            res = &mut joined => break res,
            _ = interrupts.next() => {
                info!("interrupt received, requesting close");
                commands.send(Command::Close);
            }
        }
    };

    match joined {
        Ok(Ok((ControllerExit::Closed, _))) => Ok(None),
        Ok(Ok((ControllerExit::Degraded, events))) => Ok(Some(events)),
        Ok(Err(_)) => {
            error!("preview thread panicked, requesting close");
            commands.send(Command::Close);
            Ok(None)
        }
        Err(e) => Err(TrainerErr::Join(e.to_string())),
    }
}

/// Waits for `Closed` without a display, forwarding interrupts as `Close`.
async fn headless(mut events: EventReceiver, commands: &CommandSender, interrupts: &mut Interrupts) {
    info!("running headless");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::Progress(progress)) => {
                    debug!(iteration = progress.iteration; "progress");
                }
                Some(Event::Closed) | None => break,
            },
            _ = interrupts.next() => {
                info!("interrupt received, requesting close");
                if !commands.send(Command::Close) {
                    warn!("trainer already gone");
                }
            }
        }
    }
}

fn join(worker: JoinHandle<WorkerMetrics>) -> Result<WorkerMetrics> {
    worker.join().map_err(|_| TrainerErr::WorkerPanicked)
}
