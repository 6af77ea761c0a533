use std::{
    panic::{self, AssertUnwindSafe},
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::{
    artifact::Trainable,
    channel::{CommandReceiver, EventSender},
    config::{GoalPolicy, TrainerConfig},
    msg::{Command, Event, Preview, Progress},
    ready::{Readiness, ReadySignal},
    schedule::{HookRequest, Schedule},
};

use super::{metrics::WorkerMetrics, progress, session::Session};

/// Worker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    GoalReached,
    Closing,
    Terminated,
}

/// Owns the trainable artifact and drives it until `Close` or a fatal step failure.
///
/// Each iteration, in order:
/// 1. tick the scheduled hooks and apply their requests;
/// 2. run one step if still training (forcing a checkpoint after iteration 1);
/// 3. checkpoint and switch to `GoalReached` when the target is newly met;
/// 4. run the periodic checkpoint + `Progress` if its window elapsed;
/// 5. on the very first iteration, emit `Progress` and fire the readiness signal;
/// 6. drain the commands queued right now, without waiting.
///
/// Whatever happens, the artifact is finalized and `Closed` is the last event sent.
///
/// In debug mode nothing is ever checkpointed, previews come from
/// [`Trainable::render_debug_preview`] and training is paced by the idle back-off.
pub struct WorkerLoop<T> {
    artifact: T,
    schedule: Schedule,
    commands: CommandReceiver,
    events: EventSender,
    ready: ReadySignal,
    phase: Phase,
    session: Session,
    metrics: WorkerMetrics,
    no_preview: bool,
    debug: bool,
    goal_policy: GoalPolicy,
    idle: Duration,
}

impl<T: Trainable> WorkerLoop<T> {
    /// Creates the loop. The session clock starts now.
    ///
    /// # Args
    /// * `artifact` - The trainable artifact; owned by the loop from here on.
    /// * `cfg` - Runtime knobs (checkpoint window, idle back-off, preview and goal policy).
    /// * `schedule` - Registered hooks, whose clock should start at the same time.
    /// * `commands` - Receiving end of the controller's command queue.
    /// * `events` - Sending end of the event queue.
    /// * `ready` - One-shot readiness signal for bootstrap.
    pub fn new(
        artifact: T,
        cfg: &TrainerConfig,
        schedule: Schedule,
        commands: CommandReceiver,
        events: EventSender,
        ready: ReadySignal,
    ) -> Self {
        let goal_reached = artifact.goal_reached();
        let session = Session::new(
            artifact.current_iteration(),
            goal_reached,
            Instant::now(),
            cfg.checkpoint_interval(),
        );

        Self {
            phase: if goal_reached {
                Phase::GoalReached
            } else {
                Phase::Training
            },
            artifact,
            schedule,
            commands,
            events,
            ready,
            session,
            metrics: WorkerMetrics::default(),
            no_preview: cfg.no_preview,
            debug: cfg.debug,
            goal_policy: cfg.goal_policy,
            idle: cfg.worker_idle(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs until `Close` or a fatal step failure, then finalizes the artifact and
    /// emits `Closed`.
    ///
    /// # Returns
    /// The loop's counters.
    pub fn run(mut self) -> WorkerMetrics {
        self.log_banner();

        match panic::catch_unwind(AssertUnwindSafe(|| self.drive())) {
            Ok(Ok(())) => info!("closing at iteration {}", self.session.iteration()),
            Ok(Err(e)) => {
                error!("training step failed: {e:#}");
                self.metrics.failed = true;
            }
            Err(_) => {
                error!("training step panicked");
                self.metrics.failed = true;
            }
        }

        self.terminate();
        self.metrics
    }

    fn drive(&mut self) -> anyhow::Result<()> {
        let mut first = true;

        loop {
            let now = Instant::now();

            let requests = self.schedule.tick(
                now,
                self.session.iteration(),
                self.session.goal_reached(),
            );
            self.metrics.add_hook_requests(requests.len());
            for request in requests {
                self.apply_hook_request(request);
            }

            if self.phase == Phase::Training {
                self.train_step()?;

                if self.artifact.goal_reached() {
                    info!("reached target iteration");
                    self.save();
                    self.session.reach_goal();
                    self.phase = Phase::GoalReached;
                    info!("training stopped, preview-only mode");
                }
            }

            if self.session.periodic_checkpoint_due(now) && self.phase != Phase::GoalReached {
                self.save();
                self.emit_progress();
            }

            if first {
                first = false;
                if self.phase == Phase::GoalReached {
                    self.advance_inference_only();
                }
                self.emit_progress();
            }

            self.handle_commands();

            match self.phase {
                Phase::Closing => return Ok(()),
                Phase::GoalReached => thread::sleep(self.idle),
                Phase::Training if self.debug => thread::sleep(self.idle),
                Phase::Training | Phase::Terminated => {}
            }
        }
    }

    fn train_step(&mut self) -> anyhow::Result<()> {
        if self.session.steps_completed() == 0 && self.session.iteration() == 0 {
            info!("first iteration, if it fails try reducing the model dimensions");
        }

        let report = self.artifact.perform_step()?;
        self.session.record_step(report.iteration);
        self.metrics.bump_step();

        let history = self.artifact.loss_history();
        let latest = history.last().map(Vec::as_slice).unwrap_or_default();
        info!(target: "progress", "{}", progress::step_line(report.iteration, report.elapsed, latest));

        if let Some((from, to)) = self.session.take_average_range(report.iteration) {
            let mean = progress::mean_losses(progress::history_range(history, from, to));
            info!(target: "progress", "{}", progress::step_line(report.iteration, report.elapsed, &mean));
        }

        if report.iteration == 1 {
            self.save();
        }

        Ok(())
    }

    fn handle_commands(&mut self) {
        let pending: Vec<Command> = self.commands.drain().collect();

        for cmd in pending {
            debug!(iteration = self.session.iteration(); "handling {cmd:?}");

            match cmd {
                Command::Save => self.save(),
                Command::Backup => self.backup(),
                Command::RequestPreview => {
                    if self.phase == Phase::GoalReached {
                        self.advance_inference_only();
                    }
                    self.emit_progress();
                }
                Command::Close => {
                    self.save();
                    self.phase = Phase::Closing;
                    return;
                }
            }
        }

        if self.commands.is_disconnected() {
            info!("command queue disconnected, closing");
            self.save();
            self.phase = Phase::Closing;
        }
    }

    fn apply_hook_request(&mut self, request: HookRequest) {
        debug!(iteration = self.session.iteration(); "hook requested {request:?}");

        match request {
            HookRequest::Checkpoint => self.save(),
            HookRequest::Backup => self.backup(),
            HookRequest::Preview => {
                if self.phase == Phase::GoalReached {
                    self.advance_inference_only();
                }
                self.emit_progress();
            }
        }
    }

    fn checkpoint_allowed(&self) -> bool {
        !self.debug && self.session.checkpoint_allowed(self.goal_policy)
    }

    fn save(&mut self) {
        if !self.checkpoint_allowed() {
            debug!("checkpoint skipped");
            return;
        }

        info!("saving checkpoint at iteration {}", self.session.iteration());
        match self.artifact.checkpoint() {
            Ok(()) => {
                self.session.mark_saved();
                self.metrics.bump_checkpoint();
            }
            Err(e) => warn!("checkpoint failed: {e:#}"),
        }
    }

    fn backup(&mut self) {
        if !self.checkpoint_allowed() {
            debug!("backup skipped");
            return;
        }

        info!("creating backup at iteration {}", self.session.iteration());
        match self.artifact.backup_checkpoint() {
            Ok(()) => self.metrics.bump_backup(),
            Err(e) => warn!("backup failed: {e:#}"),
        }
    }

    fn advance_inference_only(&mut self) {
        if let Err(e) = self.artifact.advance_inference_only() {
            warn!("inference pass failed: {e:#}");
        }
    }

    fn emit_progress(&mut self) {
        let previews = if self.no_preview {
            Vec::new()
        } else {
            match self.render() {
                Ok(previews) => previews,
                Err(e) => {
                    warn!("preview rendering failed: {e:#}");
                    Vec::new()
                }
            }
        };

        let progress = Progress {
            previews,
            iteration: self.artifact.current_iteration(),
            loss_history: self.artifact.loss_history().to_vec(),
        };

        self.events.send(Event::Progress(progress));
        self.metrics.bump_progress();
        self.ready.fire(Readiness::Ready);
    }

    fn render(&mut self) -> anyhow::Result<Vec<Preview>> {
        if self.debug {
            Ok(vec![self.artifact.render_debug_preview()?])
        } else {
            self.artifact.render_previews()
        }
    }

    fn terminate(&mut self) {
        self.phase = Phase::Terminated;

        match panic::catch_unwind(AssertUnwindSafe(|| self.artifact.finalize())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("finalize failed: {e:#}"),
            Err(_) => error!("finalize panicked"),
        }

        self.events.send(Event::Closed);
        self.ready.fire(Readiness::GaveUp);
    }

    fn log_banner(&self) {
        match self.artifact.target_iteration() {
            Some(_) if self.phase == Phase::GoalReached => {
                info!("model already trained to target iteration, preview available")
            }
            Some(target) => {
                info!("starting, target iteration: {target}, press [Enter] to stop and save")
            }
            None => info!("starting, press [Enter] to stop and save"),
        }
    }
}
