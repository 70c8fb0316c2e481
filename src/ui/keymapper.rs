//! Key mapping for physical keyboards
//!
//! Converts crossterm key events into the same actions the on-screen
//! keyboard produces, so both input paths share one adapter.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::keyboard::KeyAction;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Result of mapping one key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapped {
    Action(KeyAction),
    /// Leave the program
    Quit,
}

/// Key mapper for physical key events
pub struct KeyMapper;

impl KeyMapper {
    pub fn map(event: &KeyEvent) -> Option<Mapped> {
        let mods = Modifiers::from(event.modifiers);

        if mods.contains(Modifiers::CTRL) {
            return match event.code {
                KeyCode::Char('c') | KeyCode::Char('C') => Some(Mapped::Action(KeyAction::Interrupt)),
                KeyCode::Char('q') | KeyCode::Char('Q') => Some(Mapped::Quit),
                KeyCode::Char('k') | KeyCode::Char('K') => Some(Mapped::Action(KeyAction::Hide)),
                _ => None,
            };
        }

        // Alt combinations have no equivalent on the on-screen keyboard.
        if mods.contains(Modifiers::ALT) {
            return None;
        }

        let action = match event.code {
            KeyCode::Char(ch) => KeyAction::Char(ch),
            KeyCode::Tab => KeyAction::Char('\t'),
            KeyCode::Enter => KeyAction::Enter,
            KeyCode::Backspace => KeyAction::Backspace,
            KeyCode::Left => KeyAction::Left,
            KeyCode::Right => KeyAction::Right,
            KeyCode::F(1) => KeyAction::Hide,
            _ => return None,
        };
        Some(Mapped::Action(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_char_keys() {
        let event = key_event(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Action(KeyAction::Char('a'))));

        // Shifted characters arrive already upper-cased.
        let event = key_event(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Action(KeyAction::Char('A'))));

        let event = key_event(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_control_keys() {
        let event = key_event(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Action(KeyAction::Interrupt)));

        let event = key_event(KeyCode::Char('q'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Quit));

        let event = key_event(KeyCode::Char('z'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_editing_keys() {
        let event = key_event(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Action(KeyAction::Enter)));

        let event = key_event(KeyCode::Backspace, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Action(KeyAction::Backspace)));

        let event = key_event(KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some(Mapped::Action(KeyAction::Char('\t'))));

        let event = key_event(KeyCode::F(5), KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_modifier_conversion() {
        let mods = Modifiers::from(KeyModifiers::CONTROL | KeyModifiers::SHIFT);
        assert!(mods.contains(Modifiers::CTRL | Modifiers::SHIFT));
        assert!(!mods.contains(Modifiers::ALT));
    }
}
