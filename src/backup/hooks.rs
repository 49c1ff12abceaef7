use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::AddMsg;
use crate::backup::shell::run_shell;
use itertools::Itertools;
use tracing::{info, warn};

/// Runs every hook in order, continuing past failures.
///
/// All failures are returned together; callers treat them as warnings.
pub fn run_hooks<S: AsRef<str>>(commands: &[S]) -> Result<()> {
    let errors = commands
        .iter()
        .filter_map(|command| {
            let command: &str = command.as_ref();
            info!("Running hook: {}", command);
            run_shell(command)
                .add_msg(format!("Hook {:?} failed", command))
                .inspect_err(|e| warn!("{e}"))
                .err()
        })
        .collect_vec();

    convert_error_vec(errors)
}
