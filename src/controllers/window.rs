//! Window management by title, shelling out to `wmctrl`.

use std::time::Duration;

use crate::action::{ActionCommand, ActionParams, ControllerKind};
use crate::config::ShellConfig;
use crate::controllers::shell::run_with_timeout;
use crate::controllers::{Controller, ControllerError};

pub struct WindowController {
    cfg: ShellConfig,
}

impl WindowController {
    pub fn new(cfg: ShellConfig) -> Self {
        Self { cfg }
    }

    /// True when `wmctrl` answers at all; registration is skipped otherwise.
    pub fn probe(cfg: &ShellConfig) -> bool {
        run_with_timeout(&cfg.shell, "command -v wmctrl", Duration::from_secs(2)).is_ok()
    }

    fn wmctrl(&self, args: &str, title: &str) -> Result<String, ControllerError> {
        // Titles are single-quoted for the shell; embedded quotes are
        // escaped the POSIX way.
        let quoted = format!("'{}'", title.replace('\'', r"'\''"));
        run_with_timeout(
            &self.cfg.shell,
            &format!("wmctrl {} {}", args, quoted),
            Duration::from_secs(self.cfg.timeout_secs),
        )
    }
}

impl Controller for WindowController {
    fn execute(
        &mut self,
        command: &ActionCommand,
        _params: &ActionParams,
    ) -> Result<String, ControllerError> {
        match command {
            ActionCommand::WindowActivate(title) => {
                self.wmctrl("-a", title)?;
                Ok(format!("activated {}", title))
            }
            ActionCommand::WindowClose(title) => {
                self.wmctrl("-c", title)?;
                Ok(format!("closed {}", title))
            }
            ActionCommand::WindowMinimize(title) => {
                self.wmctrl("-b add,hidden -r", title)?;
                Ok(format!("minimized {}", title))
            }
            ActionCommand::WindowMaximize(title) => {
                self.wmctrl("-b add,maximized_vert,maximized_horz -r", title)?;
                Ok(format!("maximized {}", title))
            }
            _ => Err(ControllerError::Unsupported {
                kind: ControllerKind::Window,
            }),
        }
    }
}
