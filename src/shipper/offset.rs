//! Persisted read offset of a tailed file.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One integer encoded as text, overwritten on every save.
#[derive(Debug, Clone)]
pub struct OffsetStore {
    path: PathBuf,
}

impl OffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<log file>.position`, next to the tailed file.
    pub fn beside(log_file: &Path) -> Self {
        let mut path = OsString::from(log_file.as_os_str());
        path.push(".position");
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved offset. A missing or unreadable file means start from 0.
    pub async fn load(&self) -> u64 {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text.trim().parse().unwrap_or_else(|e| {
                warn!("Ignoring corrupt offset file {}: {}", self.path.display(), e);
                0
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!("Cannot read offset file {}: {}", self.path.display(), e);
                0
            }
        }
    }

    /// Replace the saved offset. Written to a sibling file first and renamed
    /// over the old one so a crash never leaves a torn value.
    pub async fn save(&self, offset: u64) -> io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, offset.to_string()).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
