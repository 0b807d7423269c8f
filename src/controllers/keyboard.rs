//! Keyboard emulation via enigo, with a clipboard-paste path for text.

use std::thread::sleep;
use std::time::Duration;

use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use crate::action::{ActionCommand, ActionParams, ControllerKind};
use crate::config::KeyboardConfig;
use crate::controllers::{Controller, ControllerError};

/// Resolve a lowercase key name to an enigo key. Single characters map to
/// unicode keys; everything else must be a known name.
pub fn parse_key(name: &str) -> Option<Key> {
    let name = name.trim().to_lowercase();
    let key = match name.as_str() {
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "meta" | "super" | "cmd" | "win" => Key::Meta,
        "enter" | "return" => Key::Return,
        "esc" | "escape" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" => Key::PageUp,
        "pagedown" | "page_down" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = name.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Key::Unicode(c)
        }
    };
    Some(key)
}

pub struct KeyboardController {
    enigo: Enigo,
    cfg: KeyboardConfig,
    held: Vec<String>,
}

impl KeyboardController {
    pub fn new(cfg: KeyboardConfig) -> Result<Self, ControllerError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| ControllerError::Execution(format!("enigo init: {}", e)))?;
        Ok(Self {
            enigo,
            cfg,
            held: Vec::new(),
        })
    }

    fn key(&mut self, name: &str, direction: Direction) -> Result<(), ControllerError> {
        let key = parse_key(name)
            .ok_or_else(|| ControllerError::Execution(format!("unknown key: {}", name)))?;
        self.enigo
            .key(key, direction)
            .map_err(|e| ControllerError::Execution(e.to_string()))
    }

    /// Press modifiers in order, click the final key, release in reverse.
    /// The short sleeps give the focused application time to observe the
    /// modifier state.
    fn combo(&mut self, keys: &[String]) -> Result<(), ControllerError> {
        let (last, modifiers) = match keys.split_last() {
            Some(pair) => pair,
            None => return Ok(()),
        };
        for m in modifiers {
            self.key(m, Direction::Press)?;
            sleep(Duration::from_millis(10));
        }
        let result = self.key(last, Direction::Click);
        sleep(Duration::from_millis(50));
        for m in modifiers.iter().rev() {
            // Best-effort: release the rest even if one release fails.
            let _ = self.key(m, Direction::Release);
        }
        result
    }

    fn type_text(&mut self, text: &str) -> Result<(), ControllerError> {
        if self.cfg.input_method == "clipboard" {
            return self.paste_text(text);
        }
        self.enigo
            .text(text)
            .map_err(|e| ControllerError::Execution(e.to_string()))
    }

    /// Stash the clipboard, put the text on it, paste, then restore.
    fn paste_text(&mut self, text: &str) -> Result<(), ControllerError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| ControllerError::Execution(format!("clipboard: {}", e)))?;
        let previous = clipboard.get_text().ok();
        clipboard
            .set_text(text.to_string())
            .map_err(|e| ControllerError::Execution(format!("clipboard: {}", e)))?;
        sleep(Duration::from_millis(50));
        self.combo(&["ctrl".into(), "v".into()])?;
        sleep(Duration::from_millis(100));
        if let Some(previous) = previous {
            let _ = clipboard.set_text(previous);
        }
        Ok(())
    }
}

impl Controller for KeyboardController {
    fn execute(
        &mut self,
        command: &ActionCommand,
        _params: &ActionParams,
    ) -> Result<String, ControllerError> {
        match command {
            ActionCommand::KeyTap(name) => {
                self.key(name, Direction::Click)?;
                Ok(format!("tapped {}", name))
            }
            ActionCommand::KeyCombo(keys) => {
                self.combo(keys)?;
                Ok(format!("pressed {}", keys.join("+")))
            }
            ActionCommand::KeyText(text) => {
                self.type_text(text)?;
                Ok(format!("typed {} chars", text.chars().count()))
            }
            ActionCommand::KeyHold(name) => {
                self.key(name, Direction::Press)?;
                if !self.held.contains(name) {
                    self.held.push(name.clone());
                }
                Ok(format!("holding {}", name))
            }
            ActionCommand::KeyRelease(name) => {
                self.key(name, Direction::Release)?;
                self.held.retain(|h| h != name);
                Ok(format!("released {}", name))
            }
            _ => Err(ControllerError::Unsupported {
                kind: ControllerKind::Keyboard,
            }),
        }
    }

    fn release_all(&mut self) {
        let held = std::mem::take(&mut self.held);
        for name in held {
            let _ = self.key(&name, Direction::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_keys() {
        assert!(matches!(parse_key("ctrl"), Some(Key::Control)));
        assert!(matches!(parse_key("Enter"), Some(Key::Return)));
        assert!(matches!(parse_key("f5"), Some(Key::F5)));
    }

    #[test]
    fn test_parse_single_char() {
        assert!(matches!(parse_key("a"), Some(Key::Unicode('a'))));
        assert!(matches!(parse_key("7"), Some(Key::Unicode('7'))));
    }

    #[test]
    fn test_parse_unknown() {
        assert!(parse_key("nosuchkey").is_none());
        assert!(parse_key("").is_none());
    }
}
