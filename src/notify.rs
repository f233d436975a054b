//! Desktop notifications. Always best-effort: callers log failures and move on.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{HarvestError, Result};

/// Title shown on every notification.
pub const NOTIFICATION_TITLE: &str = "Extract Email Attachments";

/// Something that can show a short message to the user.
pub trait Notifier {
    fn notify(&self, message: &str) -> Result<()>;
}

/// Runs `terminal-notifier` (or a compatible program).
///
/// Clicking the notification opens the attachments directory.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: PathBuf,
    open_dir: PathBuf,
}

impl CommandNotifier {
    pub fn new(program: impl Into<PathBuf>, open_dir: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            open_dir: open_dir.as_ref().to_path_buf(),
        }
    }

    fn args(&self, message: &str) -> Vec<String> {
        vec![
            "-title".into(),
            NOTIFICATION_TITLE.into(),
            "-message".into(),
            message.into(),
            "-open".into(),
            format!("file://{}", self.open_dir.display()),
            "-sound".into(),
            "default".into(),
        ]
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        debug!(program = %self.program.display(), message, "Sending notification");
        let status = Command::new(&self.program)
            .args(self.args(message))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                HarvestError::Notification(format!(
                    "cannot run '{}': {e}",
                    self.program.display()
                ))
            })?;
        if !status.success() {
            return Err(HarvestError::Notification(format!(
                "'{}' exited with {status}",
                self.program.display()
            )));
        }
        Ok(())
    }
}

/// Writes the message to the log instead of the desktop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        info!(message, "Notification");
        Ok(())
    }
}
