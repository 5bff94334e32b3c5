//! Maps key presses to soundboard actions.

use crate::pads::PadRegistry;

/// One key press as reported by the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyInput {
    /// Key value: a single character, `" "` or a named key such as `"Space"`.
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    /// A text field has focus; every shortcut is suppressed.
    pub in_text_input: bool,
}

impl KeyInput {
    #[cfg(test)]
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_ctrl(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ctrl: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Save,
    /// The UI should show its file picker.
    OpenFileDialog,
    ToggleRecording,
    StopAll,
    TriggerPad(String),
}

fn is_space(key: &str) -> bool {
    matches!(key, " " | "Space" | "Spacebar")
}

fn single_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Resolves a key press against the current pads.
///
/// Ctrl/Cmd combinations take precedence over pad hotkeys; an unbound combination does
/// nothing.
pub fn resolve_key(input: &KeyInput, pads: &PadRegistry) -> KeyAction {
    if input.in_text_input {
        return KeyAction::None;
    }

    if input.ctrl || input.meta {
        return match single_char(&input.key).map(|c| c.to_ascii_uppercase()) {
            Some('S') => KeyAction::Save,
            Some('O') => KeyAction::OpenFileDialog,
            Some('R') => KeyAction::ToggleRecording,
            _ => KeyAction::None,
        };
    }

    if is_space(&input.key) {
        return KeyAction::StopAll;
    }

    single_char(&input.key)
        .and_then(|c| pads.find_by_hotkey(c))
        .map(|pad| KeyAction::TriggerPad(pad.id.clone()))
        .unwrap_or(KeyAction::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pads::{Pad, PadSpec};

    fn registry() -> PadRegistry {
        let mut pads = PadRegistry::new();
        for (id, key) in [("kick", 'A'), ("snare", 'S'), ("clap", 'a')] {
            pads.insert(Pad::from_spec(
                id.to_string(),
                PadSpec {
                    hotkey: Some(key),
                    ..PadSpec::default()
                },
            ));
        }
        pads
    }

    #[test]
    fn test_hotkey_triggers_last_registered_pad() {
        let pads = registry();
        assert_eq!(
            resolve_key(&KeyInput::plain("a"), &pads),
            KeyAction::TriggerPad("clap".to_string())
        );
        assert_eq!(
            resolve_key(&KeyInput::plain("S"), &pads),
            KeyAction::TriggerPad("snare".to_string())
        );
        assert_eq!(resolve_key(&KeyInput::plain("z"), &pads), KeyAction::None);
    }

    #[test]
    fn test_modifier_shortcuts() {
        let pads = registry();
        assert_eq!(resolve_key(&KeyInput::with_ctrl("s"), &pads), KeyAction::Save);
        assert_eq!(resolve_key(&KeyInput::with_ctrl("O"), &pads), KeyAction::OpenFileDialog);
        assert_eq!(resolve_key(&KeyInput::with_ctrl("r"), &pads), KeyAction::ToggleRecording);
        assert_eq!(resolve_key(&KeyInput::with_ctrl("a"), &pads), KeyAction::None);

        let cmd = KeyInput {
            meta: true,
            ..KeyInput::plain("s")
        };
        assert_eq!(resolve_key(&cmd, &pads), KeyAction::Save);
    }

    #[test]
    fn test_space_stops_all() {
        let pads = registry();
        assert_eq!(resolve_key(&KeyInput::plain(" "), &pads), KeyAction::StopAll);
        assert_eq!(resolve_key(&KeyInput::plain("Space"), &pads), KeyAction::StopAll);
    }

    #[test]
    fn test_text_input_suppresses_everything() {
        let pads = registry();
        for input in [KeyInput::plain("a"), KeyInput::with_ctrl("s"), KeyInput::plain(" ")] {
            let input = KeyInput {
                in_text_input: true,
                ..input
            };
            assert_eq!(resolve_key(&input, &pads), KeyAction::None);
        }
    }
}
