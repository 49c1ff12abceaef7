//! Archive file names.
//!
//! A filename mask such as `%name%-%Y-%m-%d_%H-%M-%S` is rendered with the backup
//! name and the run's timestamp, then suffixed with the compression extension.
//! The same mask parses the timestamp back out of existing archive names, which
//! is how retention recognizes the archives it manages.

use crate::backup::compress::CompressionType;
use crate::backup::file_ext::FileExtProvider;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};

pub static NAME_TOKEN: &str = "%name%";
pub static DEFAULT_FILENAME_MASK: &str = "%name%-%Y-%m-%d_%H-%M-%S";

#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilenameMask(String);

impl From<String> for FilenameMask {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FilenameMask {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Default for FilenameMask {
    fn default() -> Self {
        DEFAULT_FILENAME_MASK.into()
    }
}

impl FilenameMask {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The date pattern following the leading `%name%` token.
    fn date_pattern(&self) -> &str {
        self.0.strip_prefix(NAME_TOKEN).unwrap_or(&self.0)
    }

    /// Whether every strftime item of the mask is understood by the formatter.
    pub fn has_valid_date_pattern(&self) -> bool {
        !StrftimeItems::new(&self.0.replace(NAME_TOKEN, ""))
            .any(|item| matches!(item, Item::Error))
    }

    /// Renders the mask without an extension.
    pub fn render(&self, name: &str, date_time: &NaiveDateTime) -> String {
        self.0
            .split(NAME_TOKEN)
            .map(|part| date_time.format(part).to_string())
            .collect::<Vec<_>>()
            .join(name)
    }

    /// Full archive file name: the rendered mask plus the compression extension.
    pub fn file_name(
        &self,
        name: &str,
        date_time: &NaiveDateTime,
        compression: CompressionType,
    ) -> String {
        let stem = self.render(name, date_time);
        match compression.file_ext() {
            Some(ext) => format!("{}.{}", stem, ext.as_ref()),
            None => stem,
        }
    }

    /// Recovers the timestamp of an archive named by [`FilenameMask::file_name`].
    ///
    /// Any of the known compression extensions is accepted, so archives written
    /// before a backup changed its compression type are still recognized.
    pub fn parse_timestamp(&self, name: &str, file_name: &str) -> Option<NaiveDateTime> {
        let rest = file_name.strip_prefix(name)?;
        let pattern = self.date_pattern();

        CompressionType::ALL
            .iter()
            .filter_map(|c| c.file_ext().map(|ext| format!(".{}", ext.as_ref())))
            .filter_map(|ext| rest.strip_suffix(ext.as_str()))
            .chain(std::iter::once(rest))
            .find_map(|candidate| parse_date_time(candidate, pattern))
    }
}

/// Parses with the full pattern; a pattern without time fields yields midnight.
fn parse_date_time(s: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, pattern).ok().or_else(|| {
        NaiveDate::parse_from_str(s, pattern)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}
