use std::time::Duration;

use crossterm::event::KeyEvent;

use super::compose::ComposedFrame;

/// A place to show frames and read keys from.
///
/// Every call may fail; the controller treats any failure as "no display" and hands
/// control back so training continues headless.
pub trait Surface: Send {
    /// Opens the window (or takes over the terminal).
    fn create_window(&mut self) -> anyhow::Result<()>;

    /// Releases whatever `create_window` acquired. Must be safe to call more than once.
    fn destroy_window(&mut self);

    /// Waits up to `timeout` for input and returns the key presses collected.
    ///
    /// This doubles as the controller's pacing, so implementations should block
    /// for roughly `timeout` when nothing arrives.
    fn poll_input(&mut self, timeout: Duration) -> anyhow::Result<Vec<KeyEvent>>;

    fn present_frame(&mut self, frame: &ComposedFrame) -> anyhow::Result<()>;
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn create_window(&mut self) -> anyhow::Result<()> {
        (**self).create_window()
    }

    fn destroy_window(&mut self) {
        (**self).destroy_window()
    }

    fn poll_input(&mut self, timeout: Duration) -> anyhow::Result<Vec<KeyEvent>> {
        (**self).poll_input(timeout)
    }

    fn present_frame(&mut self, frame: &ComposedFrame) -> anyhow::Result<()> {
        (**self).present_frame(frame)
    }
}

/// Destroys the window when dropped, including on unwind.
pub struct WindowGuard<'a, S: Surface> {
    surface: &'a mut S,
}

impl<'a, S: Surface> WindowGuard<'a, S> {
    /// Creates the window.
    ///
    /// # Errors
    /// Whatever `create_window` fails with; nothing is left to clean up in that case.
    pub fn open(surface: &'a mut S) -> anyhow::Result<Self> {
        surface.create_window()?;
        Ok(Self { surface })
    }

    pub fn surface(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: Surface> Drop for WindowGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.destroy_window();
    }
}
