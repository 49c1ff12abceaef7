//! Packaging of a captured file or directory into a single archive file.
//!
//! Every supported format is a variant of [`CompressionType`], selected by its
//! string tag when the configuration is loaded. All variants share the one
//! [`Compressor::compress`] operation.

pub mod gzip;
pub mod none;
pub mod xz;
pub mod zip;

use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddDebugObjectAndFnName;
use crate::backup::tar::{create_tar_archive, create_tar_tempfile};
use derive_more::From;
use flate2::write::GzEncoder;
use io_enum::Write;
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io;
use std::io::{BufWriter, IntoInnerError, Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Streaming encoder wrapping the final archive writer.
#[derive(Write, From)]
pub enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> Finish<W> for Encoder<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(w) => Finish::finish(w),
            Encoder::Xz(w) => Finish::finish(w),
        }
    }
}

pub trait Compressor {
    /// Packages `source` (a file or a directory tree) into the file at `destination`.
    fn compress(&self, source: &Path, destination: &Path) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum CompressionType {
    Gzip,
    Zip,
    Tar,
    #[default]
    TarGz,
    TarXz,
    None,
}

impl CompressionType {
    pub const ALL: [CompressionType; 6] = [
        CompressionType::Gzip,
        CompressionType::Zip,
        CompressionType::Tar,
        CompressionType::TarGz,
        CompressionType::TarXz,
        CompressionType::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::Gzip => "gzip",
            CompressionType::Zip => "zip",
            CompressionType::Tar => "tar",
            CompressionType::TarGz => "tar.gz",
            CompressionType::TarXz => "tar.xz",
            CompressionType::None => "none",
        }
    }

    /// Whether the format can hold a directory tree. `none` only copies a single file.
    pub fn accepts_directory(&self) -> bool {
        !matches!(self, CompressionType::None)
    }
}

impl FromStr for CompressionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(CompressionType::Gzip),
            "zip" => Ok(CompressionType::Zip),
            "tar" => Ok(CompressionType::Tar),
            "tar.gz" | "tgz" => Ok(CompressionType::TarGz),
            "tar.xz" | "txz" => Ok(CompressionType::TarXz),
            "none" | "" => Ok(CompressionType::None),
            _ => Err(Error::UnknownCompression(s.to_string())),
        }
    }
}

impl TryFrom<String> for CompressionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CompressionType> for &'static str {
    fn from(value: CompressionType) -> Self {
        value.as_str()
    }
}

impl Display for CompressionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FileExtProvider for CompressionType {
    fn file_ext(&self) -> Option<impl AsRef<str>> {
        match self {
            CompressionType::Gzip => Some("gz"),
            CompressionType::Zip => Some("zip"),
            CompressionType::Tar => Some("tar"),
            CompressionType::TarGz => Some("tar.gz"),
            CompressionType::TarXz => Some("tar.xz"),
            CompressionType::None => None,
        }
    }
}

impl Compressor for CompressionType {
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        tracing::debug!("Compressing {:?} to {:?} as {}", source, destination, self);
        match self {
            CompressionType::Gzip => gzip::GzipCompressor.compress(source, destination),
            CompressionType::Zip => zip::ZipCompressor.compress(source, destination),
            CompressionType::Tar => TarCompressor.compress(source, destination),
            CompressionType::TarGz => TarGzCompressor.compress(source, destination),
            CompressionType::TarXz => xz::TarXzCompressor.compress(source, destination),
            CompressionType::None => none::NoCompressor.compress(source, destination),
        }
        .add_debug_object_and_fn_name(*self, "compress")
    }
}

pub struct TarCompressor;

impl Compressor for TarCompressor {
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        let writer = create_tar_archive(source, BufWriter::new(File::create(destination)?))?;
        writer
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .sync_all()?;
        Ok(())
    }
}

pub struct TarGzCompressor;

impl Compressor for TarGzCompressor {
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        // Dropping the intermediate tar deletes it, on success and on failure.
        let tar_temp = create_tar_tempfile(source, destination)?;
        encode_into(tar_temp.reopen()?, destination, gzip::build_gzip_encoder)
    }
}

/// Streams `reader` through the encoder produced by `build` into a new file at
/// `destination`, flushing every layer before syncing the file.
pub(crate) fn encode_into<R, F>(mut reader: R, destination: &Path, build: F) -> Result<()>
where
    R: Read,
    F: FnOnce(BufWriter<File>) -> Result<Encoder<BufWriter<File>>>,
{
    let mut writer = File::create(destination)
        .map(BufWriter::new)
        .map_err(Error::from)
        .and_then(build)
        .map(BufWriter::new)?;

    io::copy(&mut reader, &mut writer)?;

    writer
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    Ok(())
}
