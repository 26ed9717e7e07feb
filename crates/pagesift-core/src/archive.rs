//! Session-scoped store of extracted pages
//!
//! The archive is written by keyword extraction and read by page insertion,
//! so it outlives a single operation. Whoever owns the session owns the
//! archive; it is emptied only by [`Archive::clear`] or by dropping it.

use crate::config::CollisionPolicy;
use crate::error::SiftError;
use crate::normalize::MatchKey;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File name of the packaged archive offered for download
pub const ARCHIVE_FILE_NAME: &str = "extracted_pages.zip";

/// Replace every character outside `[A-Za-z0-9]` with `_`
pub fn sanitize(s: &str, lowercase: bool) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                if lowercase {
                    c.to_ascii_lowercase()
                } else {
                    c
                }
            } else {
                '_'
            }
        })
        .collect()
}

/// Archive key for a match key: sanitized and lower-cased
pub fn archive_key(key: &MatchKey) -> String {
    sanitize(key.as_str(), true)
}

/// Download name for an archive entry
pub fn pdf_file_name(key: &str) -> String {
    format!("{}.pdf", key)
}

#[derive(Debug, Clone, Default)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
    policy: CollisionPolicy,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CollisionPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CollisionPolicy) {
        self.policy = policy;
    }

    /// Store `bytes` under `key`, applying the collision policy
    pub fn insert(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), SiftError> {
        if self.entries.contains_key(key) {
            match self.policy {
                CollisionPolicy::Reject => return Err(SiftError::Collision(key.to_string())),
                CollisionPolicy::Overwrite => {
                    warn!(key, "Archive entry overwritten");
                }
            }
        }
        self.entries.insert(key.to_string(), bytes);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Owned copy of an entry, for handing to a download
    pub fn bytes_of(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Package every entry as `<key>.pdf` in a zip archive
    pub fn to_zip(&self) -> Result<Vec<u8>, SiftError> {
        zip_entries(
            self.entries
                .iter()
                .map(|(key, bytes)| (pdf_file_name(key), bytes.as_slice())),
        )
    }

    /// Rebuild an archive from a zip written by [`Archive::to_zip`].
    ///
    /// Entries not named `<key>.pdf` are skipped.
    pub fn from_zip(bytes: &[u8], policy: CollisionPolicy) -> Result<Self, SiftError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut archive = Self::with_policy(policy);

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let Some(key) = file.name().strip_suffix(".pdf").map(str::to_string) else {
                continue;
            };
            let mut content = Vec::new();
            file.read_to_end(&mut content)
                .map_err(|e| SiftError::Archive(e.to_string()))?;
            archive.insert(&key, content)?;
        }

        Ok(archive)
    }
}

/// Write named blobs into an in-memory deflated zip
pub(crate) fn zip_entries<'a, I>(entries: I) -> Result<Vec<u8>, SiftError>
where
    I: IntoIterator<Item = (String, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer.start_file(name, options)?;
        writer
            .write_all(bytes)
            .map_err(|e| SiftError::Archive(e.to_string()))?;
    }

    Ok(writer.finish()?.into_inner())
}
