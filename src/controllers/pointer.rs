//! Pointer emulation via enigo with exponential movement smoothing.

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Mouse, Settings};

use crate::action::{ActionCommand, ActionParams, ControllerKind, PointerButton};
use crate::config::PointerConfig;
use crate::controllers::{Controller, ControllerError};

pub struct PointerController {
    enigo: Enigo,
    cfg: PointerConfig,
    display: (i32, i32),
    /// Smoothed position, screen pixels.
    prev: Option<(f32, f32)>,
    dragging: bool,
}

impl PointerController {
    pub fn new(cfg: PointerConfig) -> Result<Self, ControllerError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| ControllerError::Execution(format!("enigo init: {}", e)))?;
        let display = enigo
            .main_display()
            .map_err(|e| ControllerError::Execution(format!("display query: {}", e)))?;
        Ok(Self {
            enigo,
            cfg,
            display,
            prev: None,
            dragging: false,
        })
    }

    fn button(&self, button: PointerButton) -> Button {
        match button {
            PointerButton::Left => Button::Left,
            PointerButton::Right => Button::Right,
        }
    }

    /// Move toward the normalized target, pulled back by the smoothing
    /// factor so jittery landmarks do not shake the cursor.
    fn move_to(&mut self, x: f32, y: f32) -> Result<String, ControllerError> {
        let target = (x * self.display.0 as f32, y * self.display.1 as f32);
        let next = match self.prev {
            Some((px, py)) => (
                px + (target.0 - px) / self.cfg.smooth_factor,
                py + (target.1 - py) / self.cfg.smooth_factor,
            ),
            None => target,
        };
        self.prev = Some(next);
        self.enigo
            .move_mouse(next.0 as i32, next.1 as i32, Coordinate::Abs)
            .map_err(|e| ControllerError::Execution(e.to_string()))?;
        Ok(format!("moved to {},{}", next.0 as i32, next.1 as i32))
    }

    fn click(&mut self, button: Button, direction: Direction) -> Result<(), ControllerError> {
        self.enigo
            .button(button, direction)
            .map_err(|e| ControllerError::Execution(e.to_string()))
    }
}

impl Controller for PointerController {
    fn execute(
        &mut self,
        command: &ActionCommand,
        params: &ActionParams,
    ) -> Result<String, ControllerError> {
        match command {
            ActionCommand::PointerMove => {
                let cursor = params.cursor.ok_or_else(|| {
                    ControllerError::Execution("move without cursor position".into())
                })?;
                self.move_to(cursor.x, cursor.y)
            }
            ActionCommand::PointerClick(button) => {
                let button = self.button(*button);
                self.click(button, Direction::Click)?;
                Ok("clicked".into())
            }
            ActionCommand::PointerDoubleClick => {
                self.click(Button::Left, Direction::Click)?;
                std::thread::sleep(std::time::Duration::from_millis(50));
                self.click(Button::Left, Direction::Click)?;
                Ok("double clicked".into())
            }
            ActionCommand::PointerPress(button) => {
                if let Some(cursor) = params.cursor {
                    self.move_to(cursor.x, cursor.y)?;
                }
                let button = self.button(*button);
                self.click(button, Direction::Press)?;
                self.dragging = true;
                Ok("pressed".into())
            }
            ActionCommand::PointerRelease(button) => {
                // Guarded so shutdown release_all and an explicit drag end
                // cannot double-release.
                if self.dragging {
                    let button = self.button(*button);
                    self.click(button, Direction::Release)?;
                    self.dragging = false;
                }
                Ok("released".into())
            }
            ActionCommand::PointerScroll => {
                let delta = params.scroll_delta.unwrap_or(0);
                if delta != 0 {
                    // enigo scrolls down for positive lengths.
                    self.enigo
                        .scroll(-delta, Axis::Vertical)
                        .map_err(|e| ControllerError::Execution(e.to_string()))?;
                }
                Ok(format!("scrolled {}", delta))
            }
            _ => Err(ControllerError::Unsupported {
                kind: ControllerKind::Pointer,
            }),
        }
    }

    fn release_all(&mut self) {
        if self.dragging {
            let _ = self.click(Button::Left, Direction::Release);
            self.dragging = false;
        }
        self.prev = None;
    }
}
