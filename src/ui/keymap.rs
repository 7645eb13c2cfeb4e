//! Key bindings

use crate::ui::controller::{Input, View};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Map a terminal key event to a controller input
///
/// Only key presses count; repeats and releases are ignored.
pub fn map_key(key: KeyEvent) -> Option<Input> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Input::Quit),
            _ => None,
        };
    }

    let input = match key.code {
        KeyCode::Char('q') => Input::Quit,
        KeyCode::Enter => Input::Select,
        KeyCode::Esc | KeyCode::Backspace => Input::Back,
        KeyCode::Char('t') => Input::Trigger,
        KeyCode::Char('y') => Input::Confirm,
        KeyCode::Char('n') => Input::Cancel,
        KeyCode::Char('r') => Input::Refresh,
        KeyCode::Up | KeyCode::Char('k') => Input::Up,
        KeyCode::Down | KeyCode::Char('j') => Input::Down,
        KeyCode::Home | KeyCode::Char('g') => Input::Home,
        KeyCode::End | KeyCode::Char('G') => Input::End,
        _ => return None,
    };
    Some(input)
}

/// Footer hint for the current view
pub fn hints(view: &View) -> &'static str {
    match view {
        View::List => "↑/↓ move  Enter open  r refresh  q quit",
        View::Detail { .. } => "t trigger  r refresh  Esc back  q quit",
        View::ConfirmTrigger { .. } => "y/Enter confirm  n/Esc cancel",
        View::Error { .. } => "Esc dismiss  q quit",
    }
}
