// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-then-rename persistence of generated images.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use vimg_core::{ArtifactFile, VimgError};

/// File name prefix of every generated artifact.
pub const ARTIFACT_PREFIX: &str = "vertex_image_";

/// Suffix of in-progress writes. Partial files are hidden (dot-prefixed) too.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// The storage directory generated images are written into.
///
/// The directory is shared with the transfer channel (reader) and the
/// retention janitor (deleter). An artifact only appears under its final name
/// after its bytes are fully written and synced.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the storage directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), VimgError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            VimgError::storage(
                format!("failed to create artifact directory {}", self.root.display()),
                e,
            )
        })
    }

    /// Persists `bytes` as a new artifact and returns its descriptor.
    ///
    /// The retention clock starts when this returns.
    pub async fn persist(&self, bytes: &[u8], mime_type: &str) -> Result<ArtifactFile, VimgError> {
        self.ensure_root().await?;

        let created_at = Utc::now();
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{ARTIFACT_PREFIX}{}_{}.{}",
            created_at.format("%Y%m%d_%H%M%S"),
            &unique[..8],
            extension_for_mime(mime_type)
        );
        let final_path = self.root.join(&file_name);
        let partial_path = self.root.join(format!(".{file_name}{PARTIAL_SUFFIX}"));

        if let Err(e) = write_fully(&partial_path, bytes).await {
            discard_partial(&partial_path).await;
            return Err(VimgError::storage(
                format!("failed to write {}", partial_path.display()),
                e,
            ));
        }

        if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
            discard_partial(&partial_path).await;
            return Err(VimgError::storage(
                format!("failed to publish {}", final_path.display()),
                e,
            ));
        }

        info!(path = %final_path.display(), size = bytes.len(), "artifact saved");

        Ok(ArtifactFile {
            path: final_path,
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            created_at,
        })
    }

    /// Lists completed artifacts, skipping in-progress writes.
    pub async fn list(&self) -> Result<Vec<PathBuf>, VimgError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VimgError::storage(
                    format!("failed to list {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VimgError::storage("failed to read directory entry", e))?
        {
            let name = entry.file_name();
            if is_artifact_name(&name.to_string_lossy()) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Verifies the directory exists and accepts writes.
    pub async fn probe_writable(&self) -> Result<(), VimgError> {
        self.ensure_root().await?;
        let probe = self.root.join(format!(".probe-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|e| VimgError::storage(format!("{} is not writable", self.root.display()), e))?;
        if let Err(e) = tokio::fs::remove_file(&probe).await {
            debug!(error = %e, "failed to remove write probe");
        }
        Ok(())
    }
}

/// Whether a directory entry name is a completed artifact.
pub(crate) fn is_artifact_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(PARTIAL_SUFFIX)
}

/// Maps an image mime type to the file extension used for artifacts.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

async fn write_fully(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_writes_named_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("images"));

        let artifact = store.persist(b"\x89PNG fake", "image/png").await.unwrap();

        let name = artifact.file_name();
        assert!(name.starts_with(ARTIFACT_PREFIX), "got {name}");
        assert!(name.ends_with(".png"));
        assert_eq!(artifact.size, 9);
        assert_eq!(tokio::fs::read(&artifact.path).await.unwrap(), b"\x89PNG fake");
    }

    #[tokio::test]
    async fn persist_leaves_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.persist(b"a", "image/jpeg").await.unwrap();
        store.persist(b"b", "image/webp").await.unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(PARTIAL_SUFFIX)));
    }

    #[tokio::test]
    async fn list_skips_partial_and_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = store.persist(b"done", "image/png").await.unwrap();
        tokio::fs::write(dir.path().join(".vertex_image_x.png.partial"), b"half")
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![artifact.path]);
    }

    #[tokio::test]
    async fn list_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_writable_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested/images"));
        store.probe_writable().await.unwrap();
        assert!(store.root().is_dir());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[test]
    fn extensions_follow_mime_type() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/JPEG"), "jpg");
        assert_eq!(extension_for_mime("image/webp; q=1"), "webp");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
