//! Media catalog and output destinations
//!
//! A take writes into a pending catalog entry which is published only after
//! the encoder has released and the file handle is closed.

pub mod catalog;
pub mod filename;
pub mod sink;

pub use catalog::FsMediaCatalog;
pub use filename::media_file_name;
pub use sink::OutputSink;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog entry not found: {0}")]
    NotFound(MediaUri),

    #[error("Catalog entry already published: {0}")]
    AlreadyPublished(MediaUri),

    #[error("Catalog entry already exists: {0}")]
    AlreadyExists(MediaUri),

    #[error("A destination is already allocated: {0}")]
    DestinationBusy(MediaUri),
}

/// Location of a catalog entry, relative to the catalog root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaUri(String);

impl MediaUri {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A new catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaEntry {
    pub display_name: String,
    pub mime_type: String,
    /// Category directory, e.g. `Movies/Camcorder`
    pub relative_path: String,
}

/// Shared media store
pub trait MediaCatalog: Send + Sync {
    /// Insert an entry marked pending
    fn insert_pending(&self, entry: &NewMediaEntry) -> Result<MediaUri, StorageError>;

    /// Open a writable handle to a pending entry
    fn open_writable(&self, uri: &MediaUri) -> Result<File, StorageError>;

    /// Clear the pending flag. Returns the published path.
    fn publish(&self, uri: &MediaUri) -> Result<PathBuf, StorageError>;

    /// Remove a pending entry that will never be published
    fn discard(&self, uri: &MediaUri) -> Result<(), StorageError>;

    fn is_pending(&self, uri: &MediaUri) -> Result<bool, StorageError>;
}
