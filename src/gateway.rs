//! Process-backed gateway to the LXD command line

use declarative::{Command, CommandOutput, Error, Gateway, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command as Process, Stdio};

/// Runs commands as child processes, without a shell
///
/// Every command gets `LXD_DIR` pointing at the managed server path, so
/// the same binary can drive a non-default daemon installation.
pub struct ProcessGateway {
    lxd_dir: PathBuf,
}

impl ProcessGateway {
    pub fn new(lxd_dir: impl Into<PathBuf>) -> Self {
        Self {
            lxd_dir: lxd_dir.into(),
        }
    }
}

impl Gateway for ProcessGateway {
    fn execute(&self, cmd: &Command) -> Result<CommandOutput> {
        if cmd.is_sensitive() {
            log::debug!("exec (sensitive) {}", cmd);
        } else {
            log::debug!("exec {}", cmd);
        }

        let mut process = Process::new(&cmd.program);
        process
            .args(&cmd.args)
            .env("LXD_DIR", &self.lxd_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = process.spawn().map_err(|e| spawn_error(cmd, &e))?;

        if let (Some(input), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes())?;
        }

        let output = CommandOutput::from(child.wait_with_output()?);
        if !output.success && !cmd.is_sensitive() {
            log::trace!("{} exited with {:?}: {}", cmd, output.status, output.stderr_str().trim());
        }
        Ok(output)
    }
}

fn spawn_error(cmd: &Command, err: &std::io::Error) -> Error {
    if cmd.is_sensitive() {
        return Error::SensitiveCommandFailed;
    }
    Error::CommandFailed {
        command: cmd.to_string(),
        status: None,
        stderr: format!("failed to execute {}: {}", cmd.program, err),
    }
}
