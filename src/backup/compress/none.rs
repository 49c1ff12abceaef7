use crate::backup::compress::Compressor;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::path::Path;

/// Identity copy of a single file.
pub struct NoCompressor;

impl Compressor for NoCompressor {
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        if source.is_dir() {
            return Err(Error::from(std::io::Error::other(format!(
                "compression type none copies a single file, {:?} is a directory",
                source
            ))));
        }
        std::fs::copy(source, destination)?;
        Ok(())
    }
}
