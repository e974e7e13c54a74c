//! On-disk storage for submitted and corrected PDFs.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::config::StorageConfig;

const ALLOWED_EXTENSIONS: [&str; 1] = ["pdf"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot upload empty file")]
    Empty,

    #[error("File size exceeds maximum limit of {limit_mb}MB")]
    TooLarge { limit_mb: usize },

    #[error("Only PDF files are allowed")]
    NotPdf,

    #[error("Filename contains invalid path sequence")]
    InvalidPath,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    max_file_size: usize,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            root: root.into(),
            max_file_size,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.upload_dir, config.max_file_size)
    }

    /// Checks an upload before anything is written
    pub fn validate(&self, filename: &str, contents: &[u8]) -> Result<(), StorageError> {
        if contents.is_empty() {
            return Err(StorageError::Empty);
        }

        if contents.len() > self.max_file_size {
            return Err(StorageError::TooLarge {
                limit_mb: self.max_file_size / (1024 * 1024),
            });
        }

        let extension = file_extension(filename);
        if !ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
        {
            return Err(StorageError::NotPdf);
        }

        if filename.contains("..") {
            return Err(StorageError::InvalidPath);
        }

        Ok(())
    }

    /// Validates and writes `contents`, returning the path it was stored at.
    ///
    /// `owner` is usually the uploader's email; it only feeds into the stored file name.
    pub async fn store(
        &self,
        contents: &[u8],
        filename: &str,
        assignment_code: &str,
        owner: &str,
    ) -> Result<PathBuf, StorageError> {
        self.validate(filename, contents)?;

        tokio::fs::create_dir_all(&self.root).await?;

        let target = self
            .root
            .join(stored_file_name(filename, assignment_code, owner));
        tokio::fs::write(&target, contents).await?;

        tracing::info!("Stored {} bytes at {}", contents.len(), target.display());
        Ok(target)
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, StorageError> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a stored file. Missing files are ignored.
    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn file_extension(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or_default()
}

/// `{CODE}_{owner}_{yyyyMMdd_HHmmss}_{8 hex}.{ext}`. Anything in the owner outside
/// `[A-Za-z0-9_-]` becomes `_` so the name stays a single path component.
fn stored_file_name(filename: &str, assignment_code: &str, owner: &str) -> String {
    let owner: String = owner
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' => c,
            _ => '_',
        })
        .collect();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = uuid::Uuid::new_v4().simple().to_string();

    format!(
        "{}_{}_{}_{}.{}",
        assignment_code,
        owner,
        timestamp,
        &unique[..8],
        file_extension(filename).to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &Path) -> FileStorage {
        FileStorage::new(dir, 1024 * 1024)
    }

    #[test]
    fn rejects_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            storage(dir.path()).validate("essay.pdf", b""),
            Err(StorageError::Empty)
        ));
    }

    #[test]
    fn rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let too_big = vec![0u8; 1024 * 1024 + 1];
        let err = storage(dir.path())
            .validate("essay.pdf", &too_big)
            .unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds maximum limit of 1MB");
    }

    #[test]
    fn only_pdf_extension_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        assert!(storage.validate("essay.PDF", b"%PDF-1.7").is_ok());
        assert!(matches!(
            storage.validate("essay.docx", b"data"),
            Err(StorageError::NotPdf)
        ));
        assert!(matches!(
            storage.validate("essay", b"data"),
            Err(StorageError::NotPdf)
        ));
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            storage(dir.path()).validate("../../etc/passwd.pdf", b"data"),
            Err(StorageError::InvalidPath)
        ));
    }

    #[test]
    fn stored_name_encodes_code_and_owner() {
        let name = stored_file_name("Essay.PDF", "AB12C", "jane.doe@school.edu");
        assert!(name.starts_with("AB12C_jane_doe_school_edu_"));
        assert!(name.ends_with(".pdf"));
        // code, 4 owner parts, date, time, unique id
        assert_eq!(name.trim_end_matches(".pdf").split('_').count(), 8);
    }

    #[tokio::test]
    async fn store_load_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir.path().join("nested"));

        let path = storage
            .store(b"%PDF-1.4 body", "essay.pdf", "QWERT", "student@example.com")
            .await
            .unwrap();
        assert!(path.starts_with(dir.path().join("nested")));
        assert_eq!(storage.load(&path).await.unwrap(), b"%PDF-1.4 body");

        storage.delete(&path).await.unwrap();
        assert!(matches!(
            storage.load(&path).await,
            Err(StorageError::NotFound(_))
        ));

        // Deleting twice is fine
        storage.delete(&path).await.unwrap();
    }

    #[test]
    fn owner_cannot_introduce_path_components() {
        let name = stored_file_name("essay.pdf", "AB12C", "a/b\\c@school..edu");
        assert!(name.starts_with("AB12C_a_b_c_school__edu_"));
        assert!(!name.contains('/') && !name.contains('\\'));
    }

    #[tokio::test]
    async fn stores_under_an_owner_with_a_slash() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let path = storage
            .store(b"%PDF-1.4 body", "essay.pdf", "AB12C", "a/b@school.edu")
            .await
            .unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(storage.load(&path).await.unwrap(), b"%PDF-1.4 body");
    }
}
