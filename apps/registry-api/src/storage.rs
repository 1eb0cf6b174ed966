//! Firmware binaries on disk.
//!
//! Layout: `{base_dir}/{type}/{version}/firmware.bin`. Each write goes to
//! its own uniquely named temp file in the same directory, which is renamed
//! into place, so readers never see a partial binary and concurrent writers
//! never share a temp file.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const FILE_NAME: &str = "firmware.bin";

/// Whether `segment` is usable as one path component.
#[must_use]
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.trim().is_empty()
        && segment != "."
        && !segment.contains("..")
        && !segment.contains(['/', '\\', '\0'])
}

/// Size and checksum of a stored binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub size_bytes: i64,
    pub sha256: String,
}

/// Directory-backed firmware store.
#[derive(Debug, Clone)]
pub struct FirmwareStore {
    base_dir: PathBuf,
}

impl FirmwareStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding one version.
    #[must_use]
    pub fn dir(&self, firmware_type: &str, version: &str) -> PathBuf {
        self.base_dir.join(firmware_type).join(version)
    }

    #[must_use]
    pub fn file_path(&self, firmware_type: &str, version: &str) -> PathBuf {
        self.dir(firmware_type, version).join(FILE_NAME)
    }

    /// Write `data` atomically and return its size and SHA-256.
    pub async fn save(
        &self,
        firmware_type: &str,
        version: &str,
        data: &[u8],
    ) -> io::Result<StoredFile> {
        let sha256 = hex::encode(Sha256::digest(data));

        let dir = self.dir(firmware_type, version);
        fs::create_dir_all(&dir).await?;

        let dest = dir.join(FILE_NAME);
        // The temp path is deleted on drop unless persisted.
        let (file, tmp_path) = tempfile::Builder::new()
            .prefix(".firmware.")
            .suffix(".tmp")
            .tempfile_in(&dir)?
            .into_parts();
        let mut file = fs::File::from_std(file);
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        tmp_path.persist(&dest).map_err(|e| e.error)?;

        tracing::debug!(
            firmware_type = %firmware_type,
            version = %version,
            file = %dest.display(),
            size_bytes = data.len(),
            "Firmware file written to storage"
        );

        Ok(StoredFile {
            size_bytes: i64::try_from(data.len()).unwrap_or(i64::MAX),
            sha256,
        })
    }

    /// Open a stored binary for reading.
    pub async fn open(&self, firmware_type: &str, version: &str) -> io::Result<fs::File> {
        fs::File::open(self.file_path(firmware_type, version)).await
    }

    /// Remove a version's directory. Missing directories are not an error.
    pub async fn remove(&self, firmware_type: &str, version: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.dir(firmware_type, version)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
