pub mod command;
pub mod directory;

use crate::backup::capture::command::CommandSource;
use crate::backup::capture::directory::DirectorySource;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddDebugObjectAndFnName;
use derive_more::From;
use std::path::{Path, PathBuf};

/// Where the material of a backup comes from.
///
/// - Directory: a copy of a source tree, minus excluded paths
/// - Command: the output file written by a shell command
#[derive(Clone, Debug, From, PartialEq, Eq)]
pub enum CaptureSource {
    Directory(DirectorySource),
    Command(CommandSource),
}

/// Produces a filesystem path holding the material to package.
pub trait Capture {
    /// Materializes the capture inside `scratch` and returns the path to compress.
    ///
    /// `scratch` is a private, empty directory owned by the caller, which removes
    /// it once the archive has been written.
    fn capture(&self, scratch: &Path) -> Result<PathBuf>;
}

impl Capture for CaptureSource {
    fn capture(&self, scratch: &Path) -> Result<PathBuf> {
        match self {
            CaptureSource::Directory(c) => c.capture(scratch),
            CaptureSource::Command(c) => c.capture(scratch),
        }
        .add_debug_object_and_fn_name(self.clone(), "capture")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_capture_source_dispatches_to_directory() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), "alpha").unwrap();
        let scratch = TempDir::new().unwrap();

        let source = CaptureSource::from(DirectorySource::builder().src_dir(&src).build());
        let captured = source.capture(scratch.path()).unwrap();

        assert_eq!(std::fs::read(captured.join("a.txt")).unwrap(), b"alpha");
    }

    #[test]
    fn test_capture_error_names_the_source() {
        let scratch = TempDir::new().unwrap();
        let source =
            CaptureSource::from(DirectorySource::builder().src_dir("/nonexistent/rotabak").build());

        let err = source.capture(scratch.path()).unwrap_err();

        assert!(err.to_string().contains("/nonexistent/rotabak"));
    }
}
