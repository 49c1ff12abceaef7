use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Writes `source` as a TAR stream into `writer` and returns the writer.
///
/// A directory is stored with paths relative to itself, a single file under its
/// own file name. Symlinks are stored as symlinks.
#[named]
pub fn create_tar_archive<W: Write>(source: &Path, writer: W) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    let metadata = std::fs::metadata(source)
        .map_err(Error::from)
        .add_msg(format!("Cannot access tar source {:?}", source))?;

    let mut entry_count = 0;
    if metadata.is_dir() {
        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let relative = entry.path().strip_prefix(source)?;
            if relative.as_os_str().is_empty() {
                continue;
            }
            tracing::trace!("Adding {:?} to tar", relative);
            builder.append_path_with_name(entry.path(), relative)?;
            entry_count += 1;
        }
    } else {
        let name = source.file_name().unwrap_or(source.as_os_str());
        builder.append_path_with_name(source, name)?;
        entry_count += 1;
    }

    tracing::info!("Processed {} archive entries", entry_count);
    builder
        .into_inner()
        .map_err(Error::from)
        .add_fn_name(function_path!())
}

/// Creates a hidden TAR file next to `destination` holding `source`.
///
/// The file is removed when the returned handle is dropped.
pub fn create_tar_tempfile(source: &Path, destination: &Path) -> Result<NamedTempFile> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tar_temp = tempfile::Builder::new()
        .prefix(".rotabak-")
        .suffix(".tar")
        .tempfile_in(dir)?;
    create_tar_archive(source, tar_temp.as_file_mut())?.sync_all()?;
    Ok(tar_temp)
}
