#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::bail;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use image::RgbImage;
use tokio::time::timeout;

use preview_trainer::{
    channel::{self, CommandSender, EventReceiver},
    controller::{ComposedFrame, Surface},
    ready::{self, ReadyWaiter},
    worker::{WorkerLoop, WorkerMetrics},
    Event, LossVector, Preview, Schedule, ScheduledTask, StepReport, Trainable, TrainerConfig,
};

/// What the recording artifact saw, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Step(u64),
    Checkpoint(u64),
    Backup(u64),
    Render(u64),
    Inference(u64),
    Finalize,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub start: u64,
    pub target: Option<u64>,
    /// The step that produces this iteration fails.
    pub fail_step_at: Option<u64>,
    pub fail_checkpoints: bool,
    pub step_delay: Duration,
    pub checkpoint_delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn steps(&self) -> usize {
        self.count(|c| matches!(c, Call::Step(_)))
    }

    pub fn checkpoints(&self) -> usize {
        self.count(|c| matches!(c, Call::Checkpoint(_)))
    }
}

/// A `Trainable` that records every call and fails on cue.
pub struct RecordingArtifact {
    iteration: u64,
    history: Vec<LossVector>,
    script: Script,
    log: CallLog,
}

impl RecordingArtifact {
    pub fn new(script: Script) -> (Self, CallLog) {
        let log = CallLog::default();
        let artifact = Self {
            iteration: script.start,
            history: (0..script.start).map(|i| vec![1.0 / (i + 1) as f32]).collect(),
            script,
            log: log.clone(),
        };
        (artifact, log)
    }
}

impl Trainable for RecordingArtifact {
    fn current_iteration(&self) -> u64 {
        self.iteration
    }

    fn target_iteration(&self) -> Option<u64> {
        self.script.target
    }

    fn perform_step(&mut self) -> anyhow::Result<StepReport> {
        let started = Instant::now();
        let next = self.iteration + 1;
        if self.script.fail_step_at == Some(next) {
            bail!("step {next} blew up");
        }
        thread::sleep(self.script.step_delay);

        self.iteration = next;
        self.history.push(vec![1.0 / next as f32, 0.5]);
        self.log.push(Call::Step(next));
        Ok(StepReport {
            iteration: next,
            elapsed: started.elapsed(),
        })
    }

    fn loss_history(&self) -> &[LossVector] {
        &self.history
    }

    fn checkpoint(&mut self) -> anyhow::Result<()> {
        thread::sleep(self.script.checkpoint_delay);
        if self.script.fail_checkpoints {
            bail!("disk full");
        }
        self.log.push(Call::Checkpoint(self.iteration));
        Ok(())
    }

    fn backup_checkpoint(&mut self) -> anyhow::Result<()> {
        if self.script.fail_checkpoints {
            bail!("disk full");
        }
        self.log.push(Call::Backup(self.iteration));
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        self.log.push(Call::Finalize);
        Ok(())
    }

    fn render_previews(&mut self) -> anyhow::Result<Vec<Preview>> {
        self.log.push(Call::Render(self.iteration));
        Ok(vec![
            Preview::new("a", RgbImage::new(4, 4)),
            Preview::new("b", RgbImage::new(4, 4)),
        ])
    }

    fn advance_inference_only(&mut self) -> anyhow::Result<()> {
        self.log.push(Call::Inference(self.iteration));
        Ok(())
    }
}

/// A worker loop running on its own thread, with the test holding the other ends.
pub struct Harness {
    pub commands: CommandSender,
    pub events: EventReceiver,
    pub ready: Option<ReadyWaiter>,
    pub worker: Option<JoinHandle<WorkerMetrics>>,
}

pub fn test_config() -> TrainerConfig {
    TrainerConfig {
        worker_idle_ms: 1,
        controller_quantum_ms: 5,
        readiness_timeout_secs: 5,
        ..TrainerConfig::default()
    }
}

pub fn spawn_worker(
    artifact: RecordingArtifact,
    cfg: TrainerConfig,
    tasks: Vec<ScheduledTask>,
) -> Harness {
    let (commands, cmd_rx) = channel::command_channel();
    let (event_tx, events) = channel::event_channel();
    let (signal, waiter) = ready::readiness();

    let mut schedule = Schedule::new(Instant::now());
    for task in tasks {
        schedule.register(task);
    }

    let worker = thread::spawn(move || {
        WorkerLoop::new(artifact, &cfg, schedule, cmd_rx, event_tx, signal).run()
    });

    Harness {
        commands,
        events,
        ready: Some(waiter),
        worker: Some(worker),
    }
}

impl Harness {
    pub async fn next_event(&mut self) -> Option<Event> {
        timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("no event within 5s")
    }

    /// Collects events until the worker drops its sender.
    pub async fn events_until_disconnect(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Some(event) = self.next_event().await {
            seen.push(event);
        }
        seen
    }

    pub async fn join(&mut self) -> WorkerMetrics {
        let worker = self.worker.take().expect("already joined");
        tokio::task::spawn_blocking(move || worker.join())
            .await
            .unwrap()
            .expect("worker panicked")
    }
}

/// Polls `cond` until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// What a scripted surface went through.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub created: bool,
    pub destroyed: usize,
    pub frames: Vec<ComposedFrame>,
    pub polls: usize,
}

/// A `Surface` replaying one batch of keys per poll, optionally failing on cue.
///
/// Empty batches (and an exhausted script) wait out the poll timeout like a real terminal.
pub struct ScriptedSurface {
    keys: VecDeque<Vec<KeyEvent>>,
    fail_create: bool,
    fail_present: bool,
    log: Arc<Mutex<SurfaceLog>>,
}

impl ScriptedSurface {
    pub fn new(keys: Vec<Vec<KeyEvent>>) -> (Self, Arc<Mutex<SurfaceLog>>) {
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        let surface = Self {
            keys: keys.into(),
            fail_create: false,
            fail_present: false,
            log: log.clone(),
        };
        (surface, log)
    }

    pub fn failing_create() -> (Self, Arc<Mutex<SurfaceLog>>) {
        let (mut surface, log) = Self::new(Vec::new());
        surface.fail_create = true;
        (surface, log)
    }

    pub fn failing_present() -> (Self, Arc<Mutex<SurfaceLog>>) {
        let (mut surface, log) = Self::new(Vec::new());
        surface.fail_present = true;
        (surface, log)
    }
}

impl Surface for ScriptedSurface {
    fn create_window(&mut self) -> anyhow::Result<()> {
        if self.fail_create {
            bail!("no display");
        }
        self.log.lock().unwrap().created = true;
        Ok(())
    }

    fn destroy_window(&mut self) {
        self.log.lock().unwrap().destroyed += 1;
    }

    fn poll_input(&mut self, timeout: Duration) -> anyhow::Result<Vec<KeyEvent>> {
        self.log.lock().unwrap().polls += 1;
        let batch = self.keys.pop_front().unwrap_or_default();
        if batch.is_empty() {
            thread::sleep(timeout);
        }
        Ok(batch)
    }

    fn present_frame(&mut self, frame: &ComposedFrame) -> anyhow::Result<()> {
        if self.fail_present {
            bail!("display lost");
        }
        self.log.lock().unwrap().frames.push(frame.clone());
        Ok(())
    }
}

pub fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}
