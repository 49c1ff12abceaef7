use crate::backup::compress::Compressor;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use function_name::named;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Per-entry deflate container.
///
/// Symlinks to files are stored with the target's content. Symlinks resolving to a
/// directory are skipped, as are dangling links.
pub struct ZipCompressor;

impl Compressor for ZipCompressor {
    #[named]
    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(BufWriter::new(File::create(destination)?));

        let metadata = std::fs::metadata(source)?;
        if metadata.is_dir() {
            for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
                let entry = entry?;
                let relative = entry.path().strip_prefix(source)?;
                if relative.as_os_str().is_empty() {
                    continue;
                }
                let name = zip_entry_name(relative);

                if entry.file_type().is_dir() {
                    writer.add_directory(name, options)?;
                    continue;
                }

                let target_metadata = match std::fs::metadata(entry.path()) {
                    Ok(md) => md,
                    Err(e) => {
                        tracing::debug!("Skipping dangling link {:?}: {}", entry.path(), e);
                        continue;
                    }
                };
                if target_metadata.is_dir() {
                    tracing::debug!("Skipping symlink to directory {:?}", entry.path());
                    continue;
                }
                add_file(&mut writer, entry.path(), name, options)?;
            }
        } else {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            add_file(&mut writer, source, name, options)?;
        }

        writer
            .finish()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .sync_all()
            .map_err(Error::from)
            .add_fn_name(function_path!())
    }
}

/// Zip entry names always use `/`, whatever the host separator.
fn zip_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn add_file<W: Write + std::io::Seek>(
    writer: &mut ZipWriter<W>,
    path: &Path,
    name: String,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut file = File::open(path)?;
    let options = unix_mode(&file)
        .map(|mode| options.unix_permissions(mode))
        .unwrap_or(options);
    tracing::trace!("Adding {:?} to zip as {}", path, name);
    writer.start_file(name, options)?;
    std::io::copy(&mut file, writer)?;
    Ok(())
}

#[cfg(unix)]
fn unix_mode(file: &File) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    file.metadata().ok().map(|md| md.permissions().mode())
}

#[cfg(not(unix))]
fn unix_mode(_file: &File) -> Option<u32> {
    None
}
