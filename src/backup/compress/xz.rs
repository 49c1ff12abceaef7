use crate::backup::compress::{encode_into, Compressor, Encoder};
use crate::backup::result_error::result::Result;
use crate::backup::tar::create_tar_tempfile;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use std::io::Write;
use std::num::NonZero;
use std::path::Path;

/// Default compression level (balance of speed vs size)
static DEFAULT_COMPRESSION_LEVEL: u32 = 3;
/// Maximum threads to prevent resource exhaustion
static DEFAULT_MAX_PARALLELIZATION: usize = 32;

/// Half of the available cores, at least one and at most [`DEFAULT_MAX_PARALLELIZATION`].
fn default_thread_count() -> u32 {
    std::thread::available_parallelism()
        .map(NonZero::get)
        .map(|core| core / 2)
        .map(|t| t.clamp(1, DEFAULT_MAX_PARALLELIZATION) as u32)
        .unwrap_or(1)
}

pub fn build_xz_encoder<W: Write>(writer: W) -> Result<Encoder<W>> {
    let thread = default_thread_count();
    tracing::debug!(
        "Creating XZ compressor with level={}, threads={}",
        DEFAULT_COMPRESSION_LEVEL,
        thread
    );

    if thread == 1 {
        Ok(XzEncoder::new(writer, DEFAULT_COMPRESSION_LEVEL).into())
    } else {
        let stream = MtStreamBuilder::new()
            .preset(DEFAULT_COMPRESSION_LEVEL)
            .check(Check::Crc64)
            .threads(thread)
            .encoder()?;
        Ok(XzEncoder::new_stream(writer, stream).into())
    }
}

/// Tar followed by xz, with the intermediate tar removed on exit.
pub struct TarXzCompressor;

impl Compressor for TarXzCompressor {
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        let tar_temp = create_tar_tempfile(source, destination)?;
        encode_into(tar_temp.reopen()?, destination, build_xz_encoder)
    }
}
