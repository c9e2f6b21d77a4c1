//! Gateway and callback traits
//!
//! These traits keep the engine independent of how commands are actually
//! run and how progress is shown.

use crate::error::{Error, Result};
use crate::types::{ApplyResult, Change, Command, CommandOutput};

/// Runs commands against the external control plane
///
/// Implementors only provide [`Gateway::execute`]; the checked variants
/// turn a non-success exit into an error.
pub trait Gateway {
    /// Run a command and return its output, successful or not
    fn execute(&self, cmd: &Command) -> Result<CommandOutput>;

    /// Run a command, failing on a non-success exit
    ///
    /// Commands carrying secret arguments go through
    /// [`Gateway::execute_sensitive`].
    fn execute_checked(&self, cmd: &Command) -> Result<CommandOutput> {
        if cmd.is_sensitive() {
            return self.execute_sensitive(cmd);
        }
        let output = self.execute(cmd)?;
        if !output.success {
            return Err(Error::CommandFailed {
                command: cmd.to_string(),
                status: output.status,
                stderr: output.stderr_str().trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a command whose line or output must never be surfaced
    fn execute_sensitive(&self, cmd: &Command) -> Result<CommandOutput> {
        match self.execute(cmd) {
            Ok(output) if output.success => Ok(output),
            _ => Err(Error::SensitiveCommandFailed),
        }
    }

    /// Run a command and capture stdout
    fn capture(&self, cmd: &Command) -> Result<String> {
        Ok(self.execute_checked(cmd)?.stdout_str())
    }
}

impl<G: Gateway + ?Sized> Gateway for Box<G> {
    fn execute(&self, cmd: &Command) -> Result<CommandOutput> {
        (**self).execute(cmd)
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback {
    /// Called when starting to converge a single entity
    fn on_entity_start(&mut self, id: &str, description: &str);

    /// Called for every change, before it is applied
    fn on_change(&mut self, id: &str, change: &Change);

    /// Called when an entity's convergence completes
    fn on_entity_complete(&mut self, id: &str, result: &ApplyResult);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_entity_start(&mut self, _id: &str, _description: &str) {}
    fn on_change(&mut self, _id: &str, _change: &Change) {}
    fn on_entity_complete(&mut self, _id: &str, _result: &ApplyResult) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(false)
    }
}
