// Artifact store and lifecycle management
//
// A finished artifact is a pair on disk: the media file `{id}.mp4` and its
// metadata sidecar `{id}.json`. The pair is created together and deleted
// together. Artifacts are ephemeral session state: the storage root is
// cleared on startup, a periodic sweep evicts anything that ages out, and
// serving an artifact schedules its deletion.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Sidecar contents: `{"filename": "<display name>"}`.
#[derive(Debug, Serialize, Deserialize)]
struct SidecarMetadata {
    filename: String,
}

/// A registered, fully written, non-empty artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub display_filename: String,
    pub size_bytes: u64,
    pub created_at: SystemTime,
}

pub struct ArtifactStore {
    root: PathBuf,
    max_age: Duration,
    sweep_interval: Duration,
    post_serve_delay: Duration,
}

impl ArtifactStore {
    pub fn new(
        root: PathBuf,
        max_age: Duration,
        sweep_interval: Duration,
        post_serve_delay: Duration,
    ) -> Self {
        Self {
            root,
            max_age,
            sweep_interval,
            post_serve_delay,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the media file for a job id.
    pub fn media_path(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{}.mp4", id))
    }

    fn sidecar_path(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    /// yt-dlp output template for the primary download.
    pub fn output_template(&self, id: &Uuid) -> String {
        self.root
            .join(format!("{}.%(ext)s", id))
            .to_string_lossy()
            .to_string()
    }

    /// Remove every file under the storage root. No artifact survives a
    /// process restart.
    pub async fn clear(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!("failed to delete {}: {}", entry.path().display(), e);
                }
            }
        }
        Ok(())
    }

    /// Register a finished download. The media file must already exist and
    /// be non-empty; the sidecar is written here, making the pair complete.
    pub async fn register(&self, id: Uuid, display_filename: &str) -> Result<Artifact> {
        let file_path = self.media_path(&id);
        let meta = tokio::fs::metadata(&file_path)
            .await
            .map_err(|_| Error::not_found("Downloaded file not found"))?;
        if meta.len() == 0 {
            return Err(Error::EmptyArtifact);
        }

        let sidecar = SidecarMetadata {
            filename: display_filename.to_string(),
        };
        tokio::fs::write(self.sidecar_path(&id), serde_json::to_vec(&sidecar)?).await?;

        Ok(Artifact {
            id,
            file_path,
            display_filename: display_filename.to_string(),
            size_bytes: meta.len(),
            created_at: meta.modified().unwrap_or_else(|_| SystemTime::now()),
        })
    }

    /// Look up an artifact by its externally supplied id.
    ///
    /// The id shape is validated before any filesystem access, and the
    /// resolved path must stay inside the storage root.
    pub async fn get(&self, raw_id: &str) -> Result<Artifact> {
        let id = Uuid::parse_str(raw_id)
            .map_err(|_| Error::validation("Invalid download ID"))?;

        let file_path = self.media_path(&id);
        let resolved = tokio::fs::canonicalize(&file_path)
            .await
            .map_err(|_| Error::not_found("File not found or expired"))?;
        let resolved_root = tokio::fs::canonicalize(&self.root).await?;
        if !resolved.starts_with(&resolved_root) {
            return Err(Error::validation("Invalid download ID"));
        }

        let meta = tokio::fs::metadata(&resolved).await?;
        if meta.len() == 0 {
            return Err(Error::EmptyArtifact);
        }

        let display_filename = match tokio::fs::read(self.sidecar_path(&id)).await {
            Ok(bytes) => serde_json::from_slice::<SidecarMetadata>(&bytes)
                .map(|m| m.filename)
                .unwrap_or_else(|_| "video.mp4".to_string()),
            Err(_) => "video.mp4".to_string(),
        };

        Ok(Artifact {
            id,
            file_path: resolved,
            display_filename,
            size_bytes: meta.len(),
            created_at: meta.modified().unwrap_or_else(|_| SystemTime::now()),
        })
    }

    /// Delete the media file and its sidecar as a pair.
    pub async fn discard(&self, id: &Uuid) {
        for path in [self.media_path(id), self.sidecar_path(id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("deleted {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("error deleting {}: {}", path.display(), e),
            }
        }
    }

    /// One eviction pass: reclaim every artifact older than the maximum
    /// age. Returns the number of artifacts removed.
    pub async fn sweep_once(&self) -> usize {
        let now = SystemTime::now();
        let mut deleted = 0;

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cleanup error: {}", e);
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("error inspecting {}: {}", path.display(), e);
                    continue;
                }
            };

            if is_expired(modified, now, self.max_age) {
                info!("deleting old file: {}", path.display());
                self.discard(&id).await;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("cleaned up {} old artifact(s)", deleted);
        }
        deleted
    }

    /// Spawn the periodic eviction sweep.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            // The immediate first tick would duplicate the startup clear
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// Schedule one-shot deletion after the configured grace window. Runs
    /// independently of the sweep so slow clients get their retry window
    /// while cleanup stays guaranteed.
    pub fn schedule_post_serve_delete(self: Arc<Self>, id: Uuid) {
        tokio::spawn(async move {
            tokio::time::sleep(self.post_serve_delay).await;
            debug!("post-serve deletion for {}", id);
            self.discard(&id).await;
        });
    }
}

fn is_expired(modified: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    now.duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}
