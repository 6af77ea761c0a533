use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::msg::Command;

/// What a key press asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Send(Command),
    /// Subject to the one-in-flight rule, so not a plain `Send`.
    RequestPreview,
    NextPreview,
    CycleHistory,
}

/// Maps a key press to an action.
///
/// `Enter` and `Ctrl-C` stop and save, `s` saves, `b` backs up, `p` requests a fresh
/// preview, `Space` cycles previews and `l` cycles the loss-history range.
pub fn translate(key: &KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Action::Send(Command::Close)
        }
        KeyCode::Enter => Action::Send(Command::Close),
        KeyCode::Char('s') => Action::Send(Command::Save),
        KeyCode::Char('b') => Action::Send(Command::Backup),
        KeyCode::Char('p') => Action::RequestPreview,
        KeyCode::Char(' ') => Action::NextPreview,
        KeyCode::Char('l') => Action::CycleHistory,
        _ => Action::None,
    }
}
