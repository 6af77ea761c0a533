//! Controller side: shows what the worker reports and forwards key presses as commands.

mod compose;
mod keys;
mod loop_;
mod surface;
mod terminal;
mod view;

pub use compose::{compose, fit_height, ComposedFrame};
pub use keys::{translate, Action};
pub use loop_::{ControllerExit, ControllerLoop};
pub use surface::{Surface, WindowGuard};
pub use terminal::TerminalSurface;
pub use view::ControllerView;
