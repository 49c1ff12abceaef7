use crate::backup::capture::Capture;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};

use bon::Builder;
use derive_more::{Display, From};
use function_name::named;
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use walkdir::{DirEntry, WalkDir};

use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::result;

/// Copy of a source tree, with glob-excluded paths left out.
///
/// Exclusion patterns are matched against the path relative to `src_dir`. A
/// pattern matching a directory prunes the whole subtree.
#[derive(Clone, Debug, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct DirectorySource {
    #[builder(into)]
    src_dir: PathBuf,
    #[builder(default, into)]
    exclude: Vec<CustomDeserializedGlob>,
}

/// A glob pattern wrapper that handles custom deserialization
///
/// Wraps the `globset::Glob` type with custom serde support for
/// deserializing glob patterns from strings. Always enables literal
/// separator mode, so `*` never crosses a `/`.
#[derive(Clone, Debug, From, Display, Serialize, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    glob: Glob,
}

impl CustomDeserializedGlob {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()?
            .into())
    }
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        GlobBuilder::new(v)
            .literal_separator(true)
            .build()
            .map(CustomDeserializedGlob::from)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

impl Capture for DirectorySource {
    #[named]
    fn capture(&self, scratch: &Path) -> Result<PathBuf> {
        if !self.src_dir.is_dir() {
            tracing::error!(
                "Source directory does not exist or is not a directory: {:?}",
                self.src_dir
            );
            return Err(Error::from(std::io::Error::other(format!(
                "src_dir {:?} is not a directory",
                self.src_dir
            )))
            .add_fn_name(function_path!()));
        }

        tracing::info!(
            "Copying {:?} with {} exclude patterns",
            self.src_dir,
            self.exclude.len()
        );

        let mut builder = GlobSetBuilder::new();
        self.exclude.iter().for_each(|g| {
            builder.add(g.glob.clone());
        });
        let excludes = builder
            .build()
            .map_err(Error::from)
            .add_fn_name(function_path!())?;

        let src_dir = self.src_dir.as_path();
        let mut copied = 0usize;
        let mut skipped = 0usize;
        let walker = WalkDir::new(src_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|de| !is_excluded(de, src_dir, &excludes));

        for res in walker {
            let de = match res {
                Ok(de) => de,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if copy_entry(&de, src_dir, scratch).add_fn_name(function_path!())? {
                copied += 1;
            } else {
                skipped += 1;
            }
        }

        tracing::info!(
            "Copied {} entries from {:?}, skipped {}",
            copied,
            self.src_dir,
            skipped
        );
        Ok(scratch.to_path_buf())
    }
}

fn is_excluded(de: &DirEntry, src_dir: &Path, excludes: &GlobSet) -> bool {
    match de.path().strip_prefix(src_dir) {
        Ok(relative) if !relative.as_os_str().is_empty() => {
            let excluded = excludes.is_match(relative);
            if excluded {
                tracing::debug!("Excluding {:?}", relative);
            }
            excluded
        }
        _ => false,
    }
}

/// Copies one walked entry below `scratch`. Returns whether something was written.
///
/// Failing to read the source entry skips it with a warning. Failing to write
/// into `scratch` is an error.
fn copy_entry(de: &DirEntry, src_dir: &Path, scratch: &Path) -> Result<bool> {
    let relative = de.path().strip_prefix(src_dir)?;
    if relative.as_os_str().is_empty() {
        return Ok(false);
    }
    let dst = scratch.join(relative);
    let file_type = de.file_type();

    if file_type.is_dir() {
        std::fs::create_dir_all(&dst)
            .map_err(Error::from)
            .add_msg(format!("Creating directory {:?} failed", dst))?;
    } else if file_type.is_symlink() {
        if let Err(e) = std::fs::metadata(de.path()) {
            tracing::debug!("Skipping dangling link {:?}: {}", de.path(), e);
            return Ok(false);
        }
        let target = match std::fs::read_link(de.path()) {
            Ok(target) => target,
            Err(e) => return Ok(skip_source(de.path(), e)),
        };
        tracing::trace!("Linking {:?} -> {:?}", dst, target);
        copy_symlink(&target, de.path(), &dst)
            .map_err(Error::from)
            .add_msg(format!("Re-creating link {:?} failed", de.path()))?;
    } else if file_type.is_file() {
        let (mut reader, permissions) = match File::open(de.path())
            .and_then(|f| f.metadata().map(|md| (f, md.permissions())))
        {
            Ok(opened) => opened,
            Err(e) => return Ok(skip_source(de.path(), e)),
        };
        tracing::trace!("Copying {:?} -> {:?}", de.path(), dst);
        File::create(&dst)
            .and_then(|mut writer| {
                io::copy(&mut reader, &mut writer)?;
                writer.set_permissions(permissions)
            })
            .map_err(Error::from)
            .add_msg(format!("Copying {:?} to {:?} failed", de.path(), dst))?;
    } else {
        tracing::warn!("Skipping special file {:?}", de.path());
        return Ok(false);
    }

    Ok(true)
}

fn skip_source(path: &Path, e: io::Error) -> bool {
    tracing::warn!("Skipping unreadable source {:?}: {}", path, e);
    false
}

#[cfg(unix)]
fn copy_symlink(target: &Path, _link: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}

/// Without unix symlinks the resolved file content is copied instead.
#[cfg(not(unix))]
fn copy_symlink(_target: &Path, link: &Path, dst: &Path) -> std::io::Result<()> {
    if std::fs::metadata(link)?.is_dir() {
        tracing::debug!("Skipping symlink to directory {:?}", link);
        return Ok(());
    }
    std::fs::copy(link, dst).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::compress::tests::{create_test_tree, read_tree};
    use tempfile::TempDir;

    fn create_test_files(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("subdir"))?;
        std::fs::create_dir_all(dir.join("cache/deep"))?;
        std::fs::write(dir.join("file1.txt"), "content1")?;
        std::fs::write(dir.join("file2.log"), "content2")?;
        std::fs::write(dir.join("subdir/file3.txt"), "content3")?;
        std::fs::write(dir.join("subdir/file4.log"), "content4")?;
        std::fs::write(dir.join("cache/deep/blob"), "blob")?;
        Ok(())
    }

    fn globs(patterns: &[&str]) -> Vec<CustomDeserializedGlob> {
        patterns
            .iter()
            .map(|p| CustomDeserializedGlob::new(p).unwrap())
            .collect()
    }

    #[test]
    fn test_custom_deserialized_glob_deserialization() {
        let glob: CustomDeserializedGlob = serde_json::from_str("\"*.txt\"").unwrap();
        assert_eq!(glob.to_string(), "*.txt");
    }

    #[test]
    fn test_custom_deserialized_glob_invalid_pattern() {
        let result = serde_json::from_str::<CustomDeserializedGlob>("\"[invalid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_capture_copies_whole_tree() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        create_test_tree(&src).unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder().src_dir(&src).build();
        let captured = source.capture(scratch.path()).unwrap();

        assert_eq!(captured, scratch.path());
        assert_eq!(read_tree(&captured), read_tree(&src));
    }

    #[test]
    fn test_capture_excludes_matching_files() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder()
            .src_dir(temp_dir.path())
            .exclude(globs(&["**/*.log"]))
            .build();
        source.capture(scratch.path()).unwrap();

        assert!(scratch.path().join("file1.txt").is_file());
        assert!(scratch.path().join("subdir/file3.txt").is_file());
        assert!(!scratch.path().join("file2.log").exists());
        assert!(!scratch.path().join("subdir/file4.log").exists());
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder()
            .src_dir(temp_dir.path())
            .exclude(globs(&["*.log"]))
            .build();
        source.capture(scratch.path()).unwrap();

        assert!(!scratch.path().join("file2.log").exists());
        assert!(scratch.path().join("subdir/file4.log").is_file());
    }

    #[test]
    fn test_excluded_directory_prunes_subtree() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder()
            .src_dir(temp_dir.path())
            .exclude(globs(&["cache"]))
            .build();
        source.capture(scratch.path()).unwrap();

        assert!(!scratch.path().join("cache").exists());
        assert!(scratch.path().join("subdir").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_recreated_and_dangling_skipped() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        std::os::unix::fs::symlink("file1.txt", temp_dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink("missing", temp_dir.path().join("dangling")).unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder().src_dir(temp_dir.path()).build();
        source.capture(scratch.path()).unwrap();

        let link = scratch.path().join("link");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("file1.txt"));
        assert_eq!(std::fs::read(&link).unwrap(), b"content1");
        assert!(scratch.path().join("dangling").symlink_metadata().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_uncopyable_source_entry_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        let _listener =
            std::os::unix::net::UnixListener::bind(temp_dir.path().join("subdir/app.sock"))
                .unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder().src_dir(temp_dir.path()).build();
        source.capture(scratch.path()).unwrap();

        assert!(!scratch.path().join("subdir/app.sock").exists());
        assert_eq!(
            std::fs::read(scratch.path().join("subdir/file3.txt")).unwrap(),
            b"content3"
        );
        assert_eq!(
            std::fs::read(scratch.path().join("file1.txt")).unwrap(),
            b"content1"
        );
    }

    #[test]
    fn test_scratch_write_failure_fails_capture() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        let scratch = TempDir::new().unwrap();
        // A directory in the way of a copied file.
        std::fs::create_dir(scratch.path().join("file1.txt")).unwrap();

        let source = DirectorySource::builder().src_dir(temp_dir.path()).build();
        let err = source.capture(scratch.path()).unwrap_err();

        assert!(err.to_string().contains("file1.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o750)).unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder().src_dir(temp_dir.path()).build();
        source.capture(scratch.path()).unwrap();

        let mode = std::fs::metadata(scratch.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_capture_with_nonexistent_directory() {
        let scratch = TempDir::new().unwrap();
        let source = DirectorySource::builder()
            .src_dir("/nonexistent/directory")
            .build();

        assert!(source.capture(scratch.path()).is_err());
    }

    #[test]
    fn test_capture_with_file_as_src_dir() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not_a_directory.txt");
        std::fs::write(&file_path, "content").unwrap();
        let scratch = TempDir::new().unwrap();

        let source = DirectorySource::builder().src_dir(file_path).build();

        assert!(source.capture(scratch.path()).is_err());
    }
}
