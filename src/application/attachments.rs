//! Attachment download and reuse.
//!
//! Files land at `<downloads>/<attachment id>/<file name>`. A file already
//! on disk with the declared size is reused, anything else is fetched once.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, Attachment, Downloader, Fetched, Result, UploadFile};
use crate::infrastructure::redact;

/// What became of one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Local(UploadFile),
    /// Nothing to upload (tombstoned, or missing and ignored).
    Skipped,
}

/// Download counters for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    pub reused: usize,
    pub not_found: usize,
    pub tombstoned: usize,
}

/// Resolves attachments to local files, one download at a time.
pub struct AttachmentManager<D> {
    downloader: D,
    dir: PathBuf,
    ignore_not_found: bool,
    dir_ready: bool,
    stats: DownloadStats,
}

impl<D: Downloader> AttachmentManager<D> {
    pub fn new(downloader: D, dir: impl Into<PathBuf>, ignore_not_found: bool) -> Self {
        Self {
            downloader,
            dir: dir.into(),
            ignore_not_found,
            dir_ready: false,
            stats: DownloadStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> DownloadStats {
        self.stats
    }

    /// Resolve every attachment of a message, keeping the ones that exist.
    ///
    /// # Errors
    /// Returns the first error from [`Self::resolve`].
    pub async fn resolve_all(&mut self, attachments: &[Attachment]) -> Result<Vec<UploadFile>> {
        let mut files = Vec::new();
        for attachment in attachments {
            if let Resolution::Local(file) = self.resolve(attachment).await? {
                files.push(file);
            }
        }
        Ok(files)
    }

    /// Resolve one attachment to a local file.
    ///
    /// # Errors
    /// Returns a download error if the file cannot be fetched (or is missing
    /// and missing files are not ignored), a structure error if the
    /// downloads path is not a directory, or an IO error on write failure.
    pub async fn resolve(&mut self, attachment: &Attachment) -> Result<Resolution> {
        if attachment.is_tombstoned() {
            tracing::warn!(
                file = %attachment.id,
                "Skipping file deleted before export: {}",
                attachment.name
            );
            self.stats.tombstoned += 1;
            return Ok(Resolution::Skipped);
        }

        let filename = file_name(&attachment.name, &attachment.id);
        let path = self.dir.join(file_name(&attachment.id, "file")).join(&filename);

        if is_reusable(&path, attachment.size) {
            tracing::debug!(path = %path.display(), "Reusing downloaded file");
            self.stats.reused += 1;
            return Ok(Resolution::Local(UploadFile { path, filename }));
        }

        self.ensure_dir()?;

        match self.downloader.fetch(&attachment.url).await? {
            Fetched::Body(body) => {
                if attachment.size.is_some_and(|size| size != body.len() as u64) {
                    tracing::warn!(
                        file = %attachment.id,
                        expected = ?attachment.size,
                        actual = body.len(),
                        "Downloaded size differs from export"
                    );
                }
                write_atomically(&path, &body)?;
                tracing::info!(path = %path.display(), bytes = body.len(), "Downloaded");
                self.stats.downloaded += 1;
                Ok(Resolution::Local(UploadFile { path, filename }))
            }
            Fetched::NotFound => {
                self.stats.not_found += 1;
                if self.ignore_not_found {
                    tracing::warn!(
                        url = %redact(&attachment.url),
                        "File not found, skipping: {}",
                        attachment.name
                    );
                    Ok(Resolution::Skipped)
                } else {
                    Err(AppError::Download {
                        url: redact(&attachment.url),
                        message: "file not found".into(),
                    })
                }
            }
        }
    }

    /// Log the download counters.
    pub fn log_summary(&self) {
        let s = self.stats;
        tracing::info!(
            downloaded = s.downloaded,
            reused = s.reused,
            not_found = s.not_found,
            tombstoned = s.tombstoned,
            "Attachments resolved"
        );
    }

    fn ensure_dir(&mut self) -> Result<()> {
        if self.dir_ready {
            return Ok(());
        }
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(AppError::structure(format!(
                "Downloads path is not a directory: {}",
                self.dir.display()
            )));
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::io(
                format!("Failed to create downloads dir: {}", self.dir.display()),
                e,
            )
        })?;
        tracing::info!(dir = %self.dir.display(), "Downloading attachments");
        self.dir_ready = true;
        Ok(())
    }
}

/// Final path component of a declared name, or `fallback` when there is none.
fn file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .map_or_else(|| fallback.to_string(), |n| n.to_string_lossy().into_owned())
}

fn is_reusable(path: &Path, declared: Option<u64>) -> bool {
    match (fs::metadata(path), declared) {
        (Ok(meta), Some(size)) => meta.is_file() && meta.len() == size,
        _ => false,
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    fs::write(&part, body)
        .map_err(|e| AppError::io(format!("Failed to write {}", part.display()), e))?;
    fs::rename(&part, path)
        .map_err(|e| AppError::io(format!("Failed to move {} into place", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fakes::{FakeDownloader, WarningCounter};
    use crate::domain::Lifecycle;
    use tempfile::tempdir;

    fn attachment(size: Option<u64>) -> Attachment {
        Attachment {
            id: "F1".into(),
            name: "report.pdf".into(),
            url: "https://files.example/F1".into(),
            size,
            lifecycle: Lifecycle::Normal,
        }
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempdir().unwrap();
        let fake = FakeDownloader::with("https://files.example/F1", Fetched::Body(b"abc".to_vec()));
        let mut manager = AttachmentManager::new(fake, dir.path().join("dl"), false);

        let resolution = manager.resolve(&attachment(Some(3))).await.unwrap();

        let expected = dir.path().join("dl").join("F1").join("report.pdf");
        assert_eq!(
            resolution,
            Resolution::Local(UploadFile {
                path: expected.clone(),
                filename: "report.pdf".into()
            })
        );
        assert_eq!(fs::read(&expected).unwrap(), b"abc");
        assert!(!expected.with_file_name("report.pdf.part").exists());
        assert_eq!(manager.stats().downloaded, 1);
    }

    #[tokio::test]
    async fn test_size_match_reuses_without_download() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("F1");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("report.pdf"), b"abc").unwrap();

        let fake = FakeDownloader::default();
        let mut manager = AttachmentManager::new(fake, dir.path(), false);
        let resolution = manager.resolve(&attachment(Some(3))).await.unwrap();

        assert!(matches!(resolution, Resolution::Local(_)));
        assert_eq!(manager.downloader.calls(), 0);
        assert_eq!(manager.stats().reused, 1);
    }

    #[tokio::test]
    async fn test_size_mismatch_downloads_once() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("F1");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("report.pdf"), b"truncated").unwrap();

        let fake = FakeDownloader::with("https://files.example/F1", Fetched::Body(b"abc".to_vec()));
        let mut manager = AttachmentManager::new(fake, dir.path(), false);
        manager.resolve(&attachment(Some(3))).await.unwrap();

        assert_eq!(manager.downloader.calls(), 1);
        assert_eq!(fs::read(existing.join("report.pdf")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_tombstone_skips_download() {
        let dir = tempdir().unwrap();
        let mut manager = AttachmentManager::new(FakeDownloader::default(), dir.path(), false);
        let mut gone = attachment(None);
        gone.lifecycle = Lifecycle::Tombstoned { deleted_at: None };

        let warnings = WarningCounter::default();
        let _guard = warnings.install();

        assert_eq!(manager.resolve(&gone).await.unwrap(), Resolution::Skipped);
        assert_eq!(manager.downloader.calls(), 0);
        assert_eq!(manager.stats().tombstoned, 1);
        assert_eq!(warnings.count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_error_by_default() {
        let dir = tempdir().unwrap();
        let fake = FakeDownloader::with("https://files.example/F1", Fetched::NotFound);
        let mut manager = AttachmentManager::new(fake, dir.path(), false);

        let err = manager.resolve(&attachment(Some(3))).await.unwrap_err();
        assert!(matches!(err, AppError::Download { .. }));
        assert_eq!(manager.stats().not_found, 1);
    }

    #[tokio::test]
    async fn test_not_found_ignored() {
        let dir = tempdir().unwrap();
        let fake = FakeDownloader::with("https://files.example/F1", Fetched::NotFound);
        let mut manager = AttachmentManager::new(fake, dir.path(), true);

        assert_eq!(
            manager.resolve(&attachment(Some(3))).await.unwrap(),
            Resolution::Skipped
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal_even_when_ignoring() {
        let dir = tempdir().unwrap();
        let mut manager = AttachmentManager::new(FakeDownloader::default(), dir.path(), true);
        assert!(matches!(
            manager.resolve(&attachment(Some(3))).await,
            Err(AppError::Download { .. })
        ));
    }

    #[tokio::test]
    async fn test_downloads_path_must_be_directory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("dl");
        fs::write(&blocker, b"not a dir").unwrap();

        let fake = FakeDownloader::with("https://files.example/F1", Fetched::Body(b"abc".to_vec()));
        let mut manager = AttachmentManager::new(fake, &blocker, false);
        assert!(matches!(
            manager.resolve(&attachment(Some(3))).await,
            Err(AppError::Structure { .. })
        ));
    }

    #[tokio::test]
    async fn test_declared_name_is_reduced_to_file_name() {
        let dir = tempdir().unwrap();
        let fake = FakeDownloader::with("https://files.example/F1", Fetched::Body(b"x".to_vec()));
        let mut manager = AttachmentManager::new(fake, dir.path(), false);
        let mut sneaky = attachment(Some(1));
        sneaky.name = "../../etc/passwd".into();

        let Resolution::Local(file) = manager.resolve(&sneaky).await.unwrap() else {
            panic!("expected a local file");
        };
        assert_eq!(file.path, dir.path().join("F1").join("passwd"));
    }
}
