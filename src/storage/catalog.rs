//! Directory-backed media catalog
//!
//! Entries live under `<root>/<relative_path>/`. While pending, an entry is
//! stored as `.pending-<name>` and hidden from listings; publishing renames
//! it to `<name>`.

use super::{MediaCatalog, MediaUri, NewMediaEntry, StorageError};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const PENDING_PREFIX: &str = ".pending-";

/// Media catalog rooted at a directory
pub struct FsMediaCatalog {
    root: PathBuf,
}

impl FsMediaCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of an entry
    pub fn path_of(&self, uri: &MediaUri) -> PathBuf {
        self.root.join(uri.as_str())
    }

    fn pending_path_of(&self, uri: &MediaUri) -> PathBuf {
        let path = self.path_of(uri);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.with_file_name(format!("{PENDING_PREFIX}{name}"))
    }

    /// Published entries in a category, sorted by name
    pub fn entries(&self, relative_path: &str) -> Result<Vec<MediaUri>, StorageError> {
        let dir = self.root.join(relative_path);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(PENDING_PREFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| MediaUri::new(format!("{}/{}", relative_path.trim_end_matches('/'), name)))
            .collect())
    }
}

impl MediaCatalog for FsMediaCatalog {
    fn insert_pending(&self, entry: &NewMediaEntry) -> Result<MediaUri, StorageError> {
        let uri = MediaUri::new(format!(
            "{}/{}",
            entry.relative_path.trim_end_matches('/'),
            entry.display_name
        ));

        if self.path_of(&uri).exists() {
            return Err(StorageError::AlreadyExists(uri));
        }

        let pending = self.pending_path_of(&uri);
        if let Some(parent) = pending.parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&pending) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(uri));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!("Inserted pending entry {} ({})", uri, entry.mime_type);
        Ok(uri)
    }

    fn open_writable(&self, uri: &MediaUri) -> Result<File, StorageError> {
        let pending = self.pending_path_of(uri);
        if !pending.exists() {
            return Err(StorageError::NotFound(uri.clone()));
        }
        Ok(OpenOptions::new().write(true).truncate(true).open(pending)?)
    }

    fn publish(&self, uri: &MediaUri) -> Result<PathBuf, StorageError> {
        let pending = self.pending_path_of(uri);
        let published = self.path_of(uri);

        if !pending.exists() {
            return Err(if published.exists() {
                StorageError::AlreadyPublished(uri.clone())
            } else {
                StorageError::NotFound(uri.clone())
            });
        }

        fs::rename(&pending, &published)?;
        tracing::info!("Published {}", published.display());
        Ok(published)
    }

    fn discard(&self, uri: &MediaUri) -> Result<(), StorageError> {
        let pending = self.pending_path_of(uri);
        if !pending.exists() {
            return Err(StorageError::NotFound(uri.clone()));
        }
        fs::remove_file(&pending)?;
        tracing::debug!("Discarded pending entry {}", uri);
        Ok(())
    }

    fn is_pending(&self, uri: &MediaUri) -> Result<bool, StorageError> {
        if self.pending_path_of(uri).exists() {
            Ok(true)
        } else if self.path_of(uri).exists() {
            Ok(false)
        } else {
            Err(StorageError::NotFound(uri.clone()))
        }
    }
}
