use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::config::{HookAction, HookSpec};

/// When a scheduled task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Disabled,
    /// Fires once, at `start + delay`.
    Once(Duration),
    /// Fires at most once per window.
    Every(Duration),
}

impl Period {
    /// Builds a period from signed seconds: positive is one-shot, negative repeats
    /// every `|secs|`, zero disables the task.
    ///
    /// NaN disables the task; magnitudes too large for a `Duration` saturate to `Duration::MAX`.
    pub fn from_secs(secs: f64) -> Self {
        if secs.is_nan() || secs == 0.0 {
            return Period::Disabled;
        }

        let window = Duration::try_from_secs_f64(secs.abs()).unwrap_or(Duration::MAX);
        if secs > 0.0 {
            Period::Once(window)
        } else {
            Period::Every(window)
        }
    }
}

/// Fixed-window timer that coalesces missed windows.
///
/// `last` only ever moves forward by whole windows, so a stalled caller gets a single
/// `true` and then resumes its regular cadence.
#[derive(Debug, Clone)]
pub struct Cadence {
    window: Duration,
    last: Instant,
}

impl Cadence {
    pub fn new(window: Duration, start: Instant) -> Self {
        Self {
            window,
            last: start,
        }
    }

    /// Returns true if at least one window elapsed since the last firing.
    pub fn due(&mut self, now: Instant) -> bool {
        if self.window.is_zero() {
            return false;
        }

        let elapsed = now.saturating_duration_since(self.last);
        if elapsed < self.window {
            return false;
        }

        let windows = elapsed.as_nanos() / self.window.as_nanos();
        let skip = self.window.as_nanos() * windows;
        self.last += Duration::from_nanos(skip as u64);
        true
    }

    pub fn last(&self) -> Instant {
        self.last
    }
}

/// Something a hook may ask the worker to do after the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookRequest {
    Checkpoint,
    Backup,
    Preview,
}

/// The narrow view of the session a hook gets to see.
pub struct HookContext {
    iteration: u64,
    goal_reached: bool,
    requests: Vec<HookRequest>,
}

impl HookContext {
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn goal_reached(&self) -> bool {
        self.goal_reached
    }

    pub fn request_checkpoint(&mut self) {
        self.requests.push(HookRequest::Checkpoint);
    }

    pub fn request_backup(&mut self) {
        self.requests.push(HookRequest::Backup);
    }

    pub fn request_preview(&mut self) {
        self.requests.push(HookRequest::Preview);
    }
}

/// A user-supplied side effect run by the worker between steps.
pub trait Hook: Send {
    fn run(&mut self, ctx: &mut HookContext) -> anyhow::Result<()>;
}

impl<F> Hook for F
where
    F: FnMut(&mut HookContext) -> anyhow::Result<()> + Send,
{
    fn run(&mut self, ctx: &mut HookContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// A hook plus its trigger policy.
pub struct ScheduledTask {
    name: String,
    period: Period,
    hook: Box<dyn Hook>,
}

impl ScheduledTask {
    pub fn new<H: Hook + 'static>(name: impl Into<String>, period: Period, hook: H) -> Self {
        Self {
            name: name.into(),
            period,
            hook: Box::new(hook),
        }
    }

    /// Builds one of the declarative hooks allowed in the configuration file.
    pub fn from_spec(spec: &HookSpec) -> Self {
        let period = Period::from_secs(spec.period_secs);
        let name = format!("{:?}", spec.action).to_lowercase();

        match spec.action {
            HookAction::Checkpoint => Self::requesting(name, period, HookRequest::Checkpoint),
            HookAction::Backup => Self::requesting(name, period, HookRequest::Backup),
            HookAction::Preview => Self::requesting(name, period, HookRequest::Preview),
            HookAction::Log => Self::new(name, period, |ctx: &mut HookContext| -> anyhow::Result<()> {
                info!(iteration = ctx.iteration(); "scheduled log at iteration {}", ctx.iteration());
                Ok(())
            }),
        }
    }

    fn requesting(name: String, period: Period, request: HookRequest) -> Self {
        Self::new(name, period, move |ctx: &mut HookContext| -> anyhow::Result<()> {
            ctx.requests.push(request);
            Ok(())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Entry {
    task: ScheduledTask,
    cadence: Option<Cadence>,
    last_fired: Instant,
}

/// Registry of periodic and delayed hooks, ticked once per worker iteration.
#[derive(Debug)]
pub struct Schedule {
    start: Instant,
    entries: Vec<Entry>,
}

impl Schedule {
    /// Creates an empty registry. One-shot delays are measured from `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            entries: Vec::new(),
        }
    }

    /// Registers a task; its `last_fired` starts at the registry start time.
    pub fn register(&mut self, task: ScheduledTask) {
        let cadence = match task.period {
            Period::Every(window) => Some(Cadence::new(window, self.start)),
            _ => None,
        };

        self.entries.push(Entry {
            task,
            cadence,
            last_fired: self.start,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current period of the task registered under `name`.
    pub fn period(&self, name: &str) -> Option<Period> {
        self.entry(name).map(|e| e.task.period)
    }

    /// Last time the task registered under `name` was considered fired.
    pub fn last_fired(&self, name: &str) -> Option<Instant> {
        self.entry(name).map(|e| e.last_fired)
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.task.name == name)
    }

    /// Runs every due task at most once.
    ///
    /// Failing or panicking hooks are logged and their requests discarded; they never
    /// propagate to the caller.
    ///
    /// # Returns
    /// The requests made by the hooks that ran successfully, in registration order.
    pub fn tick(&mut self, now: Instant, iteration: u64, goal_reached: bool) -> Vec<HookRequest> {
        let mut requests = Vec::new();

        for entry in &mut self.entries {
            let due = match entry.task.period {
                Period::Disabled => false,
                Period::Once(delay) => now.saturating_duration_since(self.start) >= delay,
                Period::Every(_) => entry.cadence.as_mut().is_some_and(|c| c.due(now)),
            };

            if !due {
                continue;
            }

            match entry.task.period {
                Period::Once(_) => {
                    entry.task.period = Period::Disabled;
                    entry.last_fired = now;
                }
                Period::Every(_) => {
                    if let Some(cadence) = &entry.cadence {
                        entry.last_fired = cadence.last();
                    }
                }
                Period::Disabled => {}
            }

            let mut ctx = HookContext {
                iteration,
                goal_reached,
                requests: Vec::new(),
            };

            let hook = &mut entry.task.hook;
            match panic::catch_unwind(AssertUnwindSafe(|| hook.run(&mut ctx))) {
                Ok(Ok(())) => requests.extend(ctx.requests),
                Ok(Err(e)) => warn!("hook '{}' failed: {e:#}", entry.task.name),
                Err(_) => warn!("hook '{}' panicked", entry.task.name),
            }
        }

        requests
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Hook + 'static {
        let counter = Arc::clone(counter);
        move |_: &mut HookContext| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn period_from_signed_seconds() {
        assert_eq!(Period::from_secs(0.0), Period::Disabled);
        assert_eq!(Period::from_secs(5.0), Period::Once(Duration::from_secs(5)));
        assert_eq!(Period::from_secs(-60.0), Period::Every(Duration::from_secs(60)));
        assert_eq!(Period::from_secs(f64::NAN), Period::Disabled);
    }

    #[test]
    fn huge_periods_saturate_and_never_fire() {
        assert_eq!(Period::from_secs(1e30), Period::Once(Duration::MAX));
        assert_eq!(Period::from_secs(f64::NEG_INFINITY), Period::Every(Duration::MAX));

        let t0 = Instant::now();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut schedule = Schedule::new(t0);
        schedule.register(ScheduledTask::from_spec(&HookSpec {
            period_secs: 1e30,
            action: HookAction::Log,
        }));
        schedule.register(ScheduledTask::new("rare", Period::from_secs(-1e30), counting(&fired)));

        assert!(schedule.tick(t0 + Duration::from_secs(1_000_000), 0, false).is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeating_task_coalesces_missed_windows() {
        let t0 = Instant::now();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut schedule = Schedule::new(t0);
        schedule.register(ScheduledTask::new("rep", Period::from_secs(-60.0), counting(&fired)));

        schedule.tick(t0, 0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        schedule.tick(t0 + Duration::from_secs(185), 0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(schedule.last_fired("rep"), Some(t0 + Duration::from_secs(180)));

        // Regular cadence resumes: next window closes at 240.
        schedule.tick(t0 + Duration::from_secs(239), 0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        schedule.tick(t0 + Duration::from_secs(240), 0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn one_shot_fires_once_then_disables() {
        let t0 = Instant::now();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut schedule = Schedule::new(t0);
        schedule.register(ScheduledTask::new("once", Period::from_secs(10.0), counting(&fired)));

        schedule.tick(t0 + Duration::from_secs(9), 0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        for s in [10, 11, 500] {
            schedule.tick(t0 + Duration::from_secs(s), 0, false);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(schedule.period("once"), Some(Period::Disabled));
    }

    #[test]
    fn disabled_task_never_fires() {
        let t0 = Instant::now();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut schedule = Schedule::new(t0);
        schedule.register(ScheduledTask::new("off", Period::Disabled, counting(&fired)));

        schedule.tick(t0 + Duration::from_secs(10_000), 0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_hooks_are_contained() {
        let t0 = Instant::now();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut schedule = Schedule::new(t0);

        schedule.register(ScheduledTask::new(
            "err",
            Period::from_secs(-1.0),
            |ctx: &mut HookContext| -> anyhow::Result<()> {
                ctx.request_checkpoint();
                anyhow::bail!("boom")
            },
        ));
        schedule.register(ScheduledTask::new(
            "panic",
            Period::from_secs(-1.0),
            |_: &mut HookContext| -> anyhow::Result<()> { panic!("hook panic") },
        ));
        schedule.register(ScheduledTask::new("ok", Period::from_secs(-1.0), counting(&fired)));

        let requests = schedule.tick(t0 + Duration::from_secs(2), 0, false);
        assert!(requests.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_see_iteration_and_collect_requests() {
        let t0 = Instant::now();
        let mut schedule = Schedule::new(t0);
        schedule.register(ScheduledTask::new(
            "cap",
            Period::from_secs(1.0),
            |ctx: &mut HookContext| -> anyhow::Result<()> {
                if ctx.iteration() == 42 && !ctx.goal_reached() {
                    ctx.request_backup();
                    ctx.request_preview();
                }
                Ok(())
            },
        ));

        let requests = schedule.tick(t0 + Duration::from_secs(1), 42, false);
        assert_eq!(requests, vec![HookRequest::Backup, HookRequest::Preview]);
    }

    #[test]
    fn declarative_hooks_map_to_requests() {
        let t0 = Instant::now();
        let mut schedule = Schedule::new(t0);
        schedule.register(ScheduledTask::from_spec(&HookSpec {
            period_secs: -30.0,
            action: HookAction::Backup,
        }));
        schedule.register(ScheduledTask::from_spec(&HookSpec {
            period_secs: 5.0,
            action: HookAction::Checkpoint,
        }));

        assert!(!schedule.is_empty());
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.period("backup"), Some(Period::Every(Duration::from_secs(30))));
        let requests = schedule.tick(t0 + Duration::from_secs(30), 7, false);
        assert_eq!(requests, vec![HookRequest::Backup, HookRequest::Checkpoint]);
    }

    #[test]
    fn cadence_ignores_zero_window() {
        let t0 = Instant::now();
        let mut cadence = Cadence::new(Duration::ZERO, t0);
        assert!(!cadence.due(t0 + Duration::from_secs(1)));
    }
}
