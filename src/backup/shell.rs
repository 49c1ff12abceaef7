//! Shell command execution shared by hooks and command captures.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use function_name::named;
use std::process::Command;

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Runs `command` through the shell with inherited stdio and waits for it.
///
/// A non-zero exit status is reported as [`Error::CommandFailed`].
#[named]
pub fn run_shell(command: &str) -> Result<()> {
    tracing::debug!("Running {:?}", command);
    let status = shell_command(command)
        .status()
        .map_err(Error::from)
        .add_fn_name(function_path!())?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            command: command.to_string(),
            status,
        })
    }
}
