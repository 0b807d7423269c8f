//! Action descriptors and the typed command union.
//!
//! Profile command strings are parsed exactly once, at load time. Anything
//! that reaches the dispatcher is already a well-formed `ActionCommand`; a
//! bad string is a profile error, never a runtime probe.

use std::error::Error;
use std::fmt;

use serde::Deserialize;

use crate::classifier::CursorPos;
use crate::controllers::keyboard::parse_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    #[serde(alias = "mouse")]
    Pointer,
    Keyboard,
    #[serde(alias = "bash")]
    Shell,
    Window,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::Pointer => write!(f, "pointer"),
            ControllerKind::Keyboard => write!(f, "keyboard"),
            ControllerKind::Shell => write!(f, "shell"),
            ControllerKind::Window => write!(f, "window"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionCommand {
    /// Move the pointer to the event cursor position.
    PointerMove,
    PointerClick(PointerButton),
    PointerDoubleClick,
    PointerPress(PointerButton),
    PointerRelease(PointerButton),
    /// Scroll by the event's delta.
    PointerScroll,
    /// Tap one named key.
    KeyTap(String),
    /// Press modifiers in order, click the final key, release in reverse.
    KeyCombo(Vec<String>),
    /// Type literal text.
    KeyText(String),
    KeyHold(String),
    KeyRelease(String),
    /// Run a shell command line.
    ShellRun(String),
    WindowActivate(String),
    WindowClose(String),
    WindowMinimize(String),
    WindowMaximize(String),
}

#[derive(Debug, Clone)]
pub struct CommandParseError {
    pub kind: ControllerKind,
    pub command: String,
    pub reason: String,
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} command {:?}: {}",
            self.kind, self.command, self.reason
        )
    }
}

impl Error for CommandParseError {}

impl ActionCommand {
    pub fn kind(&self) -> ControllerKind {
        match self {
            ActionCommand::PointerMove
            | ActionCommand::PointerClick(_)
            | ActionCommand::PointerDoubleClick
            | ActionCommand::PointerPress(_)
            | ActionCommand::PointerRelease(_)
            | ActionCommand::PointerScroll => ControllerKind::Pointer,
            ActionCommand::KeyTap(_)
            | ActionCommand::KeyCombo(_)
            | ActionCommand::KeyText(_)
            | ActionCommand::KeyHold(_)
            | ActionCommand::KeyRelease(_) => ControllerKind::Keyboard,
            ActionCommand::ShellRun(_) => ControllerKind::Shell,
            ActionCommand::WindowActivate(_)
            | ActionCommand::WindowClose(_)
            | ActionCommand::WindowMinimize(_)
            | ActionCommand::WindowMaximize(_) => ControllerKind::Window,
        }
    }

    pub fn parse(kind: ControllerKind, raw: &str) -> Result<Self, CommandParseError> {
        let err = |reason: &str| CommandParseError {
            kind,
            command: raw.to_string(),
            reason: reason.to_string(),
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(err("empty command"));
        }
        match kind {
            ControllerKind::Pointer => match raw {
                "move" => Ok(ActionCommand::PointerMove),
                "click" | "left_click" => Ok(ActionCommand::PointerClick(PointerButton::Left)),
                "right_click" => Ok(ActionCommand::PointerClick(PointerButton::Right)),
                "double_click" => Ok(ActionCommand::PointerDoubleClick),
                "press" => Ok(ActionCommand::PointerPress(PointerButton::Left)),
                "release" => Ok(ActionCommand::PointerRelease(PointerButton::Left)),
                "scroll" => Ok(ActionCommand::PointerScroll),
                _ => Err(err("unknown pointer verb")),
            },
            ControllerKind::Keyboard => {
                if let Some(text) = raw.strip_prefix("type:") {
                    return Ok(ActionCommand::KeyText(text.to_string()));
                }
                if let Some(key) = raw.strip_prefix("hold:") {
                    return validate_key(key)
                        .map(ActionCommand::KeyHold)
                        .ok_or_else(|| err("unknown key name"));
                }
                if let Some(key) = raw.strip_prefix("release:") {
                    return validate_key(key)
                        .map(ActionCommand::KeyRelease)
                        .ok_or_else(|| err("unknown key name"));
                }
                if raw.contains('+') {
                    let parts: Vec<String> = raw
                        .split('+')
                        .map(|p| p.trim().to_lowercase())
                        .collect();
                    if parts.iter().any(|p| p.is_empty()) {
                        return Err(err("empty key in combo"));
                    }
                    for part in &parts {
                        if parse_key(part).is_none() {
                            return Err(err("unknown key name in combo"));
                        }
                    }
                    return Ok(ActionCommand::KeyCombo(parts));
                }
                validate_key(raw)
                    .map(ActionCommand::KeyTap)
                    .ok_or_else(|| err("unknown key name"))
            }
            ControllerKind::Shell => Ok(ActionCommand::ShellRun(raw.to_string())),
            ControllerKind::Window => {
                let (verb, title) = raw
                    .split_once(':')
                    .ok_or_else(|| err("expected verb:title"))?;
                let title = title.trim();
                if title.is_empty() {
                    return Err(err("empty window title"));
                }
                match verb.trim() {
                    "activate" | "focus" => Ok(ActionCommand::WindowActivate(title.to_string())),
                    "close" => Ok(ActionCommand::WindowClose(title.to_string())),
                    "minimize" => Ok(ActionCommand::WindowMinimize(title.to_string())),
                    "maximize" => Ok(ActionCommand::WindowMaximize(title.to_string())),
                    _ => Err(err("unknown window verb")),
                }
            }
        }
    }
}

fn validate_key(name: &str) -> Option<String> {
    let name = name.trim().to_lowercase();
    parse_key(&name).map(|_| name)
}

/// Runtime parameters an action may consume, taken from the triggering
/// gesture event.
#[derive(Debug, Clone, Default)]
pub struct ActionParams {
    pub cursor: Option<CursorPos>,
    pub scroll_delta: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub id: u64,
    pub command: ActionCommand,
    pub params: ActionParams,
    pub description: String,
    pub confidence: f32,
    pub profile: String,
}

impl ActionDescriptor {
    pub fn kind(&self) -> ControllerKind {
        self.command.kind()
    }
}

#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub action_id: u64,
    pub controller: ControllerKind,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl ActionResult {
    pub fn ok(descriptor: &ActionDescriptor, output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
            action_id: descriptor.id,
            controller: descriptor.kind(),
            timestamp: chrono::Local::now(),
        }
    }

    pub fn fail(descriptor: &ActionDescriptor, error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            action_id: descriptor.id,
            controller: descriptor.kind(),
            timestamp: chrono::Local::now(),
        }
    }

    pub fn cancelled(descriptor: &ActionDescriptor) -> Self {
        Self::fail(descriptor, "cancelled at shutdown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_verbs() {
        assert_eq!(
            ActionCommand::parse(ControllerKind::Pointer, "move").unwrap(),
            ActionCommand::PointerMove
        );
        assert_eq!(
            ActionCommand::parse(ControllerKind::Pointer, "right_click").unwrap(),
            ActionCommand::PointerClick(PointerButton::Right)
        );
        assert!(ActionCommand::parse(ControllerKind::Pointer, "warp").is_err());
    }

    #[test]
    fn test_keyboard_combo_and_text() {
        assert_eq!(
            ActionCommand::parse(ControllerKind::Keyboard, "ctrl+shift+t").unwrap(),
            ActionCommand::KeyCombo(vec!["ctrl".into(), "shift".into(), "t".into()])
        );
        assert_eq!(
            ActionCommand::parse(ControllerKind::Keyboard, "type:hello world").unwrap(),
            ActionCommand::KeyText("hello world".into())
        );
        assert_eq!(
            ActionCommand::parse(ControllerKind::Keyboard, "enter").unwrap(),
            ActionCommand::KeyTap("enter".into())
        );
    }

    #[test]
    fn test_keyboard_bad_key_rejected() {
        assert!(ActionCommand::parse(ControllerKind::Keyboard, "ctrl+nosuchkey").is_err());
        assert!(ActionCommand::parse(ControllerKind::Keyboard, "nosuchkey").is_err());
    }

    #[test]
    fn test_window_commands() {
        assert_eq!(
            ActionCommand::parse(ControllerKind::Window, "activate:Firefox").unwrap(),
            ActionCommand::WindowActivate("Firefox".into())
        );
        assert!(ActionCommand::parse(ControllerKind::Window, "Firefox").is_err());
        assert!(ActionCommand::parse(ControllerKind::Window, "shred:Firefox").is_err());
    }

    #[test]
    fn test_shell_passthrough() {
        let cmd = ActionCommand::parse(ControllerKind::Shell, "notify-send hi").unwrap();
        assert_eq!(cmd, ActionCommand::ShellRun("notify-send hi".into()));
        assert_eq!(cmd.kind(), ControllerKind::Shell);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(ActionCommand::parse(ControllerKind::Shell, "   ").is_err());
    }
}
