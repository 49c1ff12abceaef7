use crate::backup::compress::{encode_into, Compressor, Encoder};
use crate::backup::result_error::result::Result;
use crate::backup::tar::create_tar_tempfile;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn build_gzip_encoder<W: Write>(writer: W) -> Result<Encoder<W>> {
    Ok(GzEncoder::new(writer, Compression::default()).into())
}

/// Single-stream gzip. A directory source is linearized through a temporary tar first.
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        if source.is_dir() {
            tracing::debug!("Linearizing directory {:?} before gzip", source);
            let tar_temp = create_tar_tempfile(source, destination)?;
            encode_into(tar_temp.reopen()?, destination, build_gzip_encoder)
        } else {
            encode_into(File::open(source)?, destination, build_gzip_encoder)
        }
    }
}
