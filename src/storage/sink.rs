//! Output sink manager
//!
//! Allocates the pending destination for a take and publishes it once the
//! encoder is done with it. At most one destination exists at a time.

use super::{media_file_name, MediaCatalog, MediaUri, NewMediaEntry, StorageError};
use crate::notify::Notifier;
use chrono::Local;
use std::fs::File;
use std::sync::Arc;

struct Destination {
    uri: MediaUri,
    file: File,
}

/// Owns the current take's destination
pub struct OutputSink {
    catalog: Arc<dyn MediaCatalog>,
    relative_path: String,
    mime_type: String,
    extension: String,
    current: Option<Destination>,
}

impl OutputSink {
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        relative_path: &str,
        mime_type: &str,
        extension: &str,
    ) -> Self {
        Self {
            catalog,
            relative_path: relative_path.to_string(),
            mime_type: mime_type.to_string(),
            extension: extension.to_string(),
            current: None,
        }
    }

    /// Insert a pending entry and open it for writing.
    ///
    /// Returns a duplicate of the handle for the encoder; the sink keeps the
    /// original until [`finalize`](Self::finalize) or [`discard`](Self::discard).
    pub fn allocate(&mut self) -> Result<(MediaUri, File), StorageError> {
        if let Some(current) = &self.current {
            return Err(StorageError::DestinationBusy(current.uri.clone()));
        }

        let entry = NewMediaEntry {
            display_name: media_file_name(&Local::now(), &self.extension),
            mime_type: self.mime_type.clone(),
            relative_path: self.relative_path.clone(),
        };

        let uri = self.catalog.insert_pending(&entry)?;
        let file = match self
            .catalog
            .open_writable(&uri)
            .and_then(|f| f.try_clone().map(|dup| (f, dup)).map_err(StorageError::from))
        {
            Ok((file, dup)) => {
                self.current = Some(Destination {
                    uri: uri.clone(),
                    file,
                });
                dup
            }
            Err(e) => {
                if let Err(discard) = self.catalog.discard(&uri) {
                    tracing::warn!("Failed to discard {}: {}", uri, discard);
                }
                return Err(e);
            }
        };

        tracing::info!("Allocated output destination {}", uri);
        Ok((uri, file))
    }

    /// Close the handle, clear the pending flag and report the saved entry.
    ///
    /// No-op returning `Ok(None)` when nothing is allocated.
    pub fn finalize(&mut self, notifier: &Notifier) -> Result<Option<MediaUri>, StorageError> {
        let Some(Destination { uri, file }) = self.current.take() else {
            return Ok(None);
        };

        close_handle(&uri, file);
        self.catalog.publish(&uri)?;
        notifier.saved(&uri);

        Ok(Some(uri))
    }

    /// Close the handle and drop the pending entry
    pub fn discard(&mut self) -> Option<MediaUri> {
        let Destination { uri, file } = self.current.take()?;

        close_handle(&uri, file);
        match self.catalog.discard(&uri) {
            Ok(()) => tracing::info!("Discarded output destination {}", uri),
            Err(e) => tracing::warn!("Failed to discard {}: {}", uri, e),
        }
        Some(uri)
    }

    /// The allocated destination, if any
    pub fn current(&self) -> Option<&MediaUri> {
        self.current.as_ref().map(|d| &d.uri)
    }
}

fn close_handle(uri: &MediaUri, file: File) {
    if let Err(e) = file.sync_all() {
        tracing::warn!("Failed to flush output handle for {}: {}", uri, e);
    }
    drop(file);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecorderEvent;
    use crate::storage::FsMediaCatalog;
    use std::io::Write;
    use tempfile::tempdir;

    fn sink(root: &std::path::Path) -> (OutputSink, Arc<FsMediaCatalog>) {
        let catalog = Arc::new(FsMediaCatalog::new(root));
        (
            OutputSink::new(catalog.clone(), "Movies/Camcorder", "video/mp4", "mp4"),
            catalog,
        )
    }

    #[test]
    fn test_allocate_and_finalize() {
        let dir = tempdir().unwrap();
        let (mut sink, catalog) = sink(dir.path());
        let notifier = Notifier::new();
        let mut events = notifier.subscribe();

        let (uri, mut file) = sink.allocate().unwrap();
        assert!(uri.as_str().starts_with("Movies/Camcorder/"));
        assert!(uri.as_str().ends_with(".mp4"));
        assert!(catalog.is_pending(&uri).unwrap());

        file.write_all(b"mp4").unwrap();
        drop(file);

        assert_eq!(sink.finalize(&notifier).unwrap(), Some(uri.clone()));
        assert!(!catalog.is_pending(&uri).unwrap());
        assert_eq!(events.try_recv().unwrap(), RecorderEvent::Saved(uri));
        assert!(sink.current().is_none());
    }

    #[test]
    fn test_finalize_without_destination_is_noop() {
        let dir = tempdir().unwrap();
        let (mut sink, _) = sink(dir.path());
        let notifier = Notifier::new();
        let mut events = notifier.subscribe();

        assert_eq!(sink.finalize(&notifier).unwrap(), None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_single_destination() {
        let dir = tempdir().unwrap();
        let (mut sink, catalog) = sink(dir.path());

        let (uri, _file) = sink.allocate().unwrap();
        assert!(matches!(sink.allocate(), Err(StorageError::DestinationBusy(_))));

        assert_eq!(sink.discard(), Some(uri.clone()));
        assert!(catalog.is_pending(&uri).is_err());
        assert!(sink.discard().is_none());
    }
}
