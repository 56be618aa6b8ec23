// Download pipeline state machine
//
// Sequences one job end to end: title fetch, primary combined download,
// codec compatibility repair, audio validation, the separate-track fallback
// with forced re-encode merge, and subtitle injection. Emits status events
// along the way and registers the artifact on success.
//
// Failure handling is explicit: recoverable conditions (bad audio,
// incompatible codecs) are visible transitions, not caught exceptions;
// non-fatal ones (title fetch, subtitle injection, degraded audio fallback)
// are absorbed and logged as warnings. A failed job never leaves a
// retrievable artifact behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::compat;
use super::models::{DownloadJob, DownloadOutcome, JobStage, FALLBACK_TITLE};
use super::status::StatusSender;
use super::tools::MediaToolGateway;
use crate::artifacts::ArtifactStore;
use crate::error::{Error, Result};
use crate::normalizer::CanonicalUrl;

/// Fallback duration for the subtitle cue when the probe fails.
const DEFAULT_SUBTITLE_DURATION: f64 = 10.0;

pub struct Orchestrator {
    gateway: Arc<dyn MediaToolGateway>,
    store: Arc<ArtifactStore>,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn MediaToolGateway>, store: Arc<ArtifactStore>) -> Self {
        Self { gateway, store }
    }

    /// Run the full pipeline for one canonical URL.
    ///
    /// On failure the job's media/sidecar pair is discarded so no partial
    /// artifact stays reachable.
    pub async fn run(
        &self,
        canonical: CanonicalUrl,
        status: &StatusSender,
    ) -> Result<DownloadOutcome> {
        let mut job = DownloadJob::new(canonical);
        match self.run_stages(&mut job, status).await {
            Ok(outcome) => {
                info!(
                    "download complete: {} ({}) - {} bytes",
                    job.id, job.title, outcome.artifact.size_bytes
                );
                Ok(outcome)
            }
            Err(e) => {
                job.advance(JobStage::Failed);
                self.store.discard(&job.id).await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &mut DownloadJob,
        status: &StatusSender,
    ) -> Result<DownloadOutcome> {
        status.status("Fetching video info...").await;
        job.title = match self.gateway.probe_title(&job.canonical_url, job.platform).await {
            Ok(raw) => sanitize_title(&raw),
            Err(e) => {
                // Availability over metadata completeness
                warn!("failed to fetch video title: {}", e);
                FALLBACK_TITLE.to_string()
            }
        };

        job.advance(JobStage::Downloading);
        status.status("Downloading video...").await;
        self.gateway
            .download_combined(
                &job.canonical_url,
                job.platform,
                &self.store.output_template(&job.id),
            )
            .await?;

        let output = self.store.media_path(&job.id);
        if !output.exists() {
            return Err(Error::tool("yt-dlp", "downloaded file not found"));
        }

        job.advance(JobStage::CompatCheck);
        status.status("Checking video format...").await;
        let probe = self.gateway.probe_codecs(&output).await.unwrap_or_default();
        info!(
            "detected codecs - video: {:?}, audio: {:?}",
            probe.video, probe.audio
        );

        let plan = compat::plan(probe.video.as_deref(), probe.audio.as_deref());
        if !plan.is_compliant() {
            job.advance(JobStage::Reencode);
            status.status("Converting to mobile format...").await;
            self.reencode_in_place(&output, &plan).await;
        }

        job.advance(JobStage::AudioValidate);
        status.status("Validating audio...").await;
        if !self.audio_is_usable(&output).await {
            warn!("audio issue detected in {}, trying separate download", job.id);
            status.status("Fixing audio...").await;
            tokio::fs::remove_file(&output).await?;
            return self.download_separately(job, status).await;
        }

        job.advance(JobStage::SubtitleInject);
        self.inject_source_subtitle(&output, &job.canonical_url, status)
            .await;

        job.advance(JobStage::Done);
        let artifact = self.store.register(job.id, &job.display_filename()).await?;
        status.status("Complete!").await;
        Ok(DownloadOutcome {
            artifact,
            warning: None,
        })
    }

    /// Re-encode for compatibility through a temporary sibling, replacing
    /// the original only on success. Best-effort: on failure the original
    /// file is kept and the pipeline proceeds.
    async fn reencode_in_place(&self, output: &Path, plan: &compat::CompatPlan) {
        let temp = output.with_extension("temp.mp4");
        match self.gateway.transcode(output, &temp, plan).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::rename(&temp, output).await {
                    error!("failed to swap in re-encoded file: {}", e);
                    let _ = tokio::fs::remove_file(&temp).await;
                }
            }
            Err(e) => {
                error!("re-encoding failed: {}", e);
                let _ = tokio::fs::remove_file(&temp).await;
            }
        }
    }

    /// Two-step audio check: a selectable stream must exist and must not
    /// be silent. Any probe failure counts as unusable.
    async fn audio_is_usable(&self, output: &Path) -> bool {
        match self.gateway.has_audio_stream(output).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("no audio stream found in {}", output.display());
                return false;
            }
            Err(e) => {
                error!("error checking audio stream: {}", e);
                return false;
            }
        }

        match self.gateway.is_audio_silent(output).await {
            Ok(false) => true,
            Ok(true) => {
                warn!("audio stream in {} appears to be silent", output.display());
                false
            }
            Err(e) => {
                error!("error analyzing audio loudness: {}", e);
                false
            }
        }
    }

    /// Fallback path: download video and audio independently and merge
    /// them with a forced re-encode. If the audio download fails the job
    /// still succeeds with the video-only file, flagged with a warning.
    async fn download_separately(
        &self,
        job: &mut DownloadJob,
        status: &StatusSender,
    ) -> Result<DownloadOutcome> {
        job.advance(JobStage::SeparateDownload);
        info!("attempting separate video+audio download for {}", job.id);

        let video_part = self.part_path(&job.id, "video", "mp4");
        let audio_part = self.part_path(&job.id, "audio", "m4a");
        let output = self.store.media_path(&job.id);

        status.status("Downloading video track...").await;
        let video_result = self
            .gateway
            .download_stream(&job.canonical_url, job.platform, "bestvideo", &video_part)
            .await;
        if video_result.is_err() || !video_part.exists() {
            self.remove_parts(&video_part, &audio_part).await;
            return Err(Error::tool("yt-dlp", "Failed to download video stream"));
        }

        status.status("Downloading audio track...").await;
        let audio_result = self
            .gateway
            .download_stream(
                &job.canonical_url,
                job.platform,
                "bestaudio[ext=m4a]/bestaudio",
                &audio_part,
            )
            .await;

        if audio_result.is_err() || !audio_part.exists() {
            // Degraded but successful: serve the silent video rather than
            // nothing at all
            warn!("audio download failed, using video only");
            let _ = tokio::fs::remove_file(&audio_part).await;
            tokio::fs::rename(&video_part, &output).await?;

            job.advance(JobStage::SubtitleInject);
            self.inject_source_subtitle(&output, &job.canonical_url, status)
                .await;

            job.advance(JobStage::Done);
            let artifact = self.store.register(job.id, &job.display_filename()).await?;
            return Ok(DownloadOutcome {
                artifact,
                warning: Some("Video downloaded without audio".to_string()),
            });
        }

        job.advance(JobStage::Merge);
        status.status("Merging video and audio...").await;
        let merge_result = self
            .gateway
            .merge_tracks(&video_part, &audio_part, &output)
            .await;
        self.remove_parts(&video_part, &audio_part).await;

        if merge_result.is_err() || !output.exists() {
            return Err(Error::tool("ffmpeg", "Failed to merge video and audio"));
        }
        info!("successfully merged video and audio for {}", job.id);

        job.advance(JobStage::SubtitleInject);
        self.inject_source_subtitle(&output, &job.canonical_url, status)
            .await;

        job.advance(JobStage::Done);
        let artifact = self.store.register(job.id, &job.display_filename()).await?;
        Ok(DownloadOutcome {
            artifact,
            warning: None,
        })
    }

    fn part_path(&self, id: &Uuid, track: &str, ext: &str) -> PathBuf {
        self.store.root().join(format!("{}_{}.{}", id, track, ext))
    }

    async fn remove_parts(&self, video_part: &Path, audio_part: &Path) {
        for part in [video_part, audio_part] {
            let _ = tokio::fs::remove_file(part).await;
        }
    }

    /// Add a toggleable subtitle track carrying the original source URL,
    /// spanning the whole duration. Non-fatal: on any failure the file is
    /// left as it was.
    async fn inject_source_subtitle(&self, output: &Path, url: &str, status: &StatusSender) {
        status.status("Adding source info...").await;

        let duration = self
            .gateway
            .probe_duration(output)
            .await
            .unwrap_or(DEFAULT_SUBTITLE_DURATION);

        let srt_path = output.with_extension("srt");
        if let Err(e) = tokio::fs::write(&srt_path, source_url_cue(duration, url)).await {
            warn!("failed to write subtitle file: {}", e);
            return;
        }

        let temp = output.with_extension("temp.mp4");
        match self.gateway.inject_subtitle(output, &srt_path, &temp).await {
            Ok(()) => match tokio::fs::rename(&temp, output).await {
                Ok(()) => info!("added source URL subtitle track"),
                Err(e) => {
                    warn!("failed to swap in subtitled file: {}", e);
                    let _ = tokio::fs::remove_file(&temp).await;
                }
            },
            Err(e) => {
                warn!("failed to add subtitle: {}", e);
                let _ = tokio::fs::remove_file(&temp).await;
            }
        }

        let _ = tokio::fs::remove_file(&srt_path).await;
    }
}

/// Sanitize a media title for use as a filename: keep only English
/// letters, Hebrew letters, digits, whitespace, hyphens and underscores;
/// collapse runs of whitespace; cap at 100 characters.
pub fn sanitize_title(title: &str) -> String {
    lazy_static! {
        static ref DISALLOWED: Regex =
            Regex::new(r"[^a-zA-Z\x{0590}-\x{05FF}0-9\s\-_]").unwrap();
        static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    }

    let stripped = DISALLOWED.replace_all(title, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    let trimmed: String = collapsed.trim().chars().take(100).collect();

    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed
    }
}

/// One SRT cue from 00:00:00,000 to the full duration, showing the URL.
fn source_url_cue(duration: f64, url: &str) -> String {
    let duration = if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        DEFAULT_SUBTITLE_DURATION
    };
    let hours = (duration / 3600.0) as u64;
    let minutes = ((duration % 3600.0) / 60.0) as u64;
    let seconds = (duration % 60.0) as u64;
    let millis = ((duration % 1.0) * 1000.0) as u64;

    format!(
        "1\n00:00:00,000 --> {:02}:{:02}:{:02},{:03}\n{}\n",
        hours, minutes, seconds, millis, url
    )
}
