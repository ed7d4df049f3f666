use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Intermediate satellite images, one per property being processed
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Property id reduced to characters safe in a file name
    pub fn file_stem_for(property_id: &str) -> String {
        property_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn path_for(&self, property_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}_original.jpg", Self::file_stem_for(property_id)))
    }

    /// Scoped ownership of the property's temp image for one request
    pub fn guard(&self, property_id: &str) -> TempImageGuard {
        TempImageGuard {
            path: self.path_for(property_id),
            armed: true,
        }
    }
}

/// Deletes its file on release, or on drop if the request never got that far
pub struct TempImageGuard {
    path: PathBuf,
    armed: bool,
}

impl TempImageGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) {
        self.armed = false;
        remove_quietly(&self.path).await;
    }
}

impl Drop for TempImageGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temp image removed on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp image"),
        }
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Temp image removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp image"),
    }
}
