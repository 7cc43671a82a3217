use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use walkdir::WalkDir;

use crate::catalog::{Store, StoreError};
use crate::tags::{self, TagReadError};

const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a", "wav", "opus"];

/// Walks one or more music directories and feeds what it finds into the
/// catalog [`Store`]. Runs synchronously on whatever thread calls
/// [`Scanner::scan`] (a scheduler worker thread, not a tokio task), and
/// bridges into the catalog's async API via the handed-in runtime [`Handle`].
pub struct Scanner {
    music_dirs: Vec<PathBuf>,
    store: Arc<Store>,
    runtime: Handle,
    /// Guards against two scans running at once; a scan already in
    /// progress refuses a second request rather than interleaving with it.
    scan_in_progress: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { scanned: usize, skipped: usize },
    Canceled { scanned: usize, skipped: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    AlreadyInProgress,

    #[error("music directory {0:?} is not accessible: {1}")]
    RootDirInaccessible(PathBuf, std::io::Error),
}

impl Scanner {
    pub fn new(music_dirs: Vec<PathBuf>, store: Arc<Store>, runtime: Handle) -> Self {
        Self {
            music_dirs,
            store,
            runtime,
            scan_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_in_progress.load(Ordering::Acquire)
    }

    /// Walks every configured music directory, reading tags for every
    /// regular file with a supported extension and upserting it into the
    /// catalog. `cancel` is checked between files so a scheduler shutdown
    /// can interrupt a long scan promptly rather than waiting it out.
    pub fn scan(&self, cancel: &AtomicBool) -> Result<ScanOutcome, ScanError> {
        if self
            .scan_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScanError::AlreadyInProgress);
        }

        let result = self.scan_inner(cancel);
        self.scan_in_progress.store(false, Ordering::Release);
        result
    }

    fn scan_inner(&self, cancel: &AtomicBool) -> Result<ScanOutcome, ScanError> {
        let mut scanned = 0usize;
        let mut skipped = 0usize;

        for root in &self.music_dirs {
            std::fs::read_dir(root)
                .map_err(|e| ScanError::RootDirInaccessible(root.clone(), e))?;

            for entry in WalkDir::new(root).min_depth(1) {
                if cancel.load(Ordering::Acquire) {
                    return Ok(ScanOutcome::Canceled { scanned, skipped });
                }

                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        log::warn!("Skipping unreadable directory entry: {err}");
                        skipped += 1;
                        continue;
                    }
                };

                let path = entry.path();

                if !is_regular_file(&entry) {
                    continue;
                }

                if !has_supported_extension(path) {
                    continue;
                }

                match self.ingest_file(path) {
                    Ok(()) => scanned += 1,
                    Err(err) => {
                        log::warn!("Skipping {}: {err}", path.display());
                        skipped += 1;
                    }
                }
            }
        }

        Ok(ScanOutcome::Completed { scanned, skipped })
    }

    fn ingest_file(&self, path: &std::path::Path) -> Result<(), IngestError> {
        let absolute = path
            .canonicalize()
            .map_err(|e| IngestError::Canonicalize(path.to_path_buf(), e))?;
        let track_tags = tags::read_tags(&absolute)?;
        self.runtime
            .block_on(self.store.add_file(&absolute, &track_tags))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error("failed to canonicalize {0:?}: {1}")]
    Canonicalize(PathBuf, std::io::Error),

    #[error(transparent)]
    Tags(#[from] TagReadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// WalkDir (with its default `follow_links(false)`) reports a symlink as
/// its own entry without recursing through it, which already gives us
/// "directory symlinks are not recursed" for free. A symlink pointing at a
/// regular file still needs to be followed to be ingested, so those are
/// the one case checked against the link's target rather than the entry
/// itself. Sockets, devices, and FIFOs are neither and are always skipped.
fn is_regular_file(entry: &walkdir::DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_file() {
        return true;
    }
    if file_type.is_symlink() {
        return std::fs::metadata(entry.path())
            .map(|m| m.is_file())
            .unwrap_or(false);
    }
    false
}

fn has_supported_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_silence_mp3(path: &std::path::Path) {
        // Minimal content; lofty will fail to probe this, which is fine —
        // the scanner still counts it as scanned since ingest falls back
        // to default tag values rather than erroring on untagged/unreadable audio.
        fs::write(path, b"ID3").unwrap();
    }

    #[tokio::test]
    async fn scans_supported_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        write_silence_mp3(&dir.path().join("track.mp3"));
        fs::write(dir.path().join("readme.txt"), b"not audio").unwrap();

        let db_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&db_dir.path().join("catalog.db")).await.unwrap());
        let scanner = Scanner::new(vec![dir.path().to_path_buf()], store, Handle::current());

        let cancel = AtomicBool::new(false);
        let outcome = tokio::task::spawn_blocking(move || scanner.scan(&cancel))
            .await
            .unwrap()
            .unwrap();

        match outcome {
            ScanOutcome::Completed { scanned, .. } => assert_eq!(scanned, 1),
            ScanOutcome::Canceled { .. } => panic!("scan should not have been canceled"),
        }
    }

    #[tokio::test]
    async fn refuses_concurrent_scans() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&db_dir.path().join("catalog.db")).await.unwrap());
        let scanner = Scanner::new(vec![dir.path().to_path_buf()], store, Handle::current());

        scanner.scan_in_progress.store(true, Ordering::Release);
        let cancel = AtomicBool::new(false);
        let err = scanner.scan(&cancel).unwrap_err();
        assert!(matches!(err, ScanError::AlreadyInProgress));
    }
}
