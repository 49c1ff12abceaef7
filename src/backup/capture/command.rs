use crate::backup::capture::Capture;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::shell::run_shell;
use bon::Builder;
use getset::Getters;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Output file of a shell command, such as a database dump.
#[derive(Clone, Debug, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct CommandSource {
    #[builder(into)]
    command: String,
    #[builder(into)]
    output_file: PathBuf,
}

impl Capture for CommandSource {
    fn capture(&self, scratch: &Path) -> Result<PathBuf> {
        tracing::info!("Running capture command {:?}", self.command);
        run_shell(&self.command)?;

        if !self.output_file.is_file() {
            return Err(Error::from(std::io::Error::other(format!(
                "command {:?} did not produce output file {:?}",
                self.command, self.output_file
            ))));
        }

        let dst = scratch.join(
            self.output_file
                .file_name()
                .unwrap_or(OsStr::new("output")),
        );
        let size = std::fs::copy(&self.output_file, &dst)
            .map_err(Error::from)
            .add_msg(format!("Copying output file {:?} failed", self.output_file))?;
        tracing::debug!("Captured {} bytes from {:?}", size, self.output_file);

        Ok(dst)
    }
}
