use std::time::Duration;

use log::{debug, info, warn};

use crate::{
    channel::{CommandSender, EventReceiver},
    config::TrainerConfig,
    msg::{Command, Event},
};

use super::{
    compose::compose,
    keys::{self, Action},
    surface::{Surface, WindowGuard},
    view::ControllerView,
};

/// How the controller loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerExit {
    /// The worker sent `Closed` (or its queue is gone).
    Closed,
    /// The surface failed; training should continue headless.
    Degraded,
}

/// Presents worker progress on a surface and turns key presses into commands.
pub struct ControllerLoop<S> {
    surface: S,
    events: EventReceiver,
    commands: CommandSender,
    view: ControllerView,
    quantum: Duration,
    max_preview_height: u32,
}

impl<S: Surface> ControllerLoop<S> {
    pub fn new(
        surface: S,
        events: EventReceiver,
        commands: CommandSender,
        cfg: &TrainerConfig,
    ) -> Self {
        Self {
            surface,
            events,
            commands,
            view: ControllerView::new(cfg.history_windows.clone()),
            quantum: cfg.controller_quantum(),
            max_preview_height: cfg.max_preview_height,
        }
    }

    /// Runs until the worker reports `Closed` or the surface fails.
    ///
    /// # Returns
    /// How the loop ended, and the event queue so a degraded run can keep
    /// watching for `Closed`.
    pub fn run(self) -> (ControllerExit, EventReceiver) {
        let Self {
            mut surface,
            mut events,
            commands,
            mut view,
            quantum,
            max_preview_height,
        } = self;

        let mut window = match WindowGuard::open(&mut surface) {
            Ok(window) => window,
            Err(e) => {
                warn!("cannot open preview window ({e:#}), continuing headless");
                return (ControllerExit::Degraded, events);
            }
        };
        info!("preview window open");

        let exit = loop {
            let mut closed = false;
            for event in events.drain() {
                debug!(kind = event.kind(); "event received");
                match event {
                    Event::Progress(progress) => view.apply(progress),
                    Event::Closed => {
                        closed = true;
                        break;
                    }
                }
            }
            if closed || events.is_disconnected() {
                break ControllerExit::Closed;
            }

            if view.take_dirty() {
                let frame = compose(&view, max_preview_height);
                if let Err(e) = window.surface().present_frame(&frame) {
                    warn!("cannot draw preview ({e:#}), continuing headless");
                    break ControllerExit::Degraded;
                }
            }

            let pressed = match window.surface().poll_input(quantum) {
                Ok(pressed) => pressed,
                Err(e) => {
                    warn!("cannot read input ({e:#}), continuing headless");
                    break ControllerExit::Degraded;
                }
            };

            for key in &pressed {
                match keys::translate(key) {
                    Action::Send(cmd) => {
                        debug!("sending {cmd:?}");
                        commands.send(cmd);
                    }
                    Action::RequestPreview => {
                        if view.request_preview() {
                            commands.send(Command::RequestPreview);
                        }
                    }
                    Action::NextPreview => view.select_next(),
                    Action::CycleHistory => view.cycle_history_window(),
                    Action::None => {}
                }
            }
        };

        drop(window);
        info!("preview window closed");
        (exit, events)
    }
}
