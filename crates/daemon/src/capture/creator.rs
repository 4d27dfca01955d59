use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use common::crypto::LocalAuthor;
use common::magic_path::should_ignore_file;
use common::snapshot::{now_timestamp, LocalSnapshot, Metadata};

use super::{CaptureError, PathValidationError};
use crate::database::Database;

/// Stages file content and records it as the newest local snapshot of a path
///
/// The creator does no locking of its own; [`super::CaptureService`] makes
/// sure only one `create` per path runs at a time.
#[derive(Debug, Clone)]
pub struct LocalSnapshotCreator {
    root: PathBuf,
    stash: PathBuf,
    author: LocalAuthor,
    db: Database,
}

impl LocalSnapshotCreator {
    /// `root` must exist; it is canonicalized once here
    pub fn new(
        root: impl AsRef<Path>,
        stash: impl Into<PathBuf>,
        author: LocalAuthor,
        db: Database,
    ) -> std::io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
            stash: stash.into(),
            author,
            db,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stash(&self) -> &Path {
        &self.stash
    }

    pub fn author(&self) -> &LocalAuthor {
        &self.author
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Check that `path` names a capturable file under the root
    ///
    /// Relative paths are taken relative to the root. Returns the
    /// `/`-separated path relative to the root and the absolute path.
    pub async fn validate(&self, path: &Path) -> Result<(String, PathBuf), PathValidationError> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let absolute = match tokio::fs::canonicalize(&joined).await {
            Ok(resolved) => resolved,
            Err(_) => normalize(&joined),
        };

        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| PathValidationError::OutsideFolder(path.to_path_buf()))?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component.as_os_str().to_str() {
                Some(segment) => segments.push(segment),
                None => return Err(PathValidationError::Ignored(path.to_path_buf())),
            }
        }
        if segments.is_empty() {
            return Err(PathValidationError::NotAFile(path.to_path_buf()));
        }

        if should_ignore_file(relative) {
            return Err(PathValidationError::Ignored(path.to_path_buf()));
        }

        match tokio::fs::metadata(&absolute).await {
            Ok(meta) if meta.is_file() => Ok((segments.join("/"), absolute)),
            _ => Err(PathValidationError::NotAFile(path.to_path_buf())),
        }
    }

    /// Copy the live file into the stash, returning where it landed
    ///
    /// The copy goes to a temporary name first, so a stash entry is either
    /// complete or absent.
    async fn stage(&self, relpath: &str, absolute: &Path) -> Result<(PathBuf, Metadata), CaptureError> {
        let stage_err = |e: std::io::Error| CaptureError::Stage {
            relpath: relpath.to_string(),
            source: Arc::new(e),
        };

        tokio::fs::create_dir_all(&self.stash)
            .await
            .map_err(stage_err)?;

        let id = Uuid::new_v4();
        let temp = self.stash.join(format!(".{}.tmp", id));
        let staged = self.stash.join(id.to_string());

        let size = match tokio::fs::copy(absolute, &temp).await {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(stage_err(e));
            }
        };
        if let Err(e) = tokio::fs::rename(&temp, &staged).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(stage_err(e));
        }

        let mut metadata = Metadata::new();
        metadata.insert("size".to_string(), size.to_string());
        if let Some(mtime) = tokio::fs::metadata(absolute)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        {
            metadata.insert("mtime".to_string(), mtime.as_secs().to_string());
        }

        Ok((staged, metadata))
    }

    /// Capture `absolute` as the newest local snapshot of `relpath`
    pub async fn create(&self, relpath: &str, absolute: &Path) -> Result<LocalSnapshot, CaptureError> {
        let (content_path, metadata) = self.stage(relpath, absolute).await?;

        match self.record(relpath, content_path.clone(), metadata).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let _ = tokio::fs::remove_file(&content_path).await;
                Err(e)
            }
        }
    }

    async fn record(
        &self,
        relpath: &str,
        content_path: PathBuf,
        metadata: Metadata,
    ) -> Result<LocalSnapshot, CaptureError> {
        let previous = self.db.get_local_snapshot(relpath, &self.author).await?;

        // the remote head is reachable through the local chain once one exists
        let parents_remote = match previous {
            Some(_) => vec![],
            None => self
                .db
                .get_remote_snapshot(relpath)
                .await?
                .map(|remote| vec![remote.capability])
                .unwrap_or_default(),
        };

        let snapshot = LocalSnapshot::new(
            relpath,
            self.author.clone(),
            metadata,
            content_path,
            now_timestamp(),
            previous.into_iter().collect(),
            parents_remote,
        );
        self.db.store_local_snapshot(&snapshot).await?;

        tracing::debug!(
            relpath = %relpath,
            identifier = %snapshot.identifier,
            chain = snapshot.chain_len(),
            "local snapshot recorded"
        );
        Ok(snapshot)
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
