// Common data models for the download pipeline

use uuid::Uuid;

use crate::artifacts::Artifact;
use crate::normalizer::{CanonicalUrl, Platform};

/// Placeholder title used when the title fetch fails.
pub const FALLBACK_TITLE: &str = "video";

/// Stages of the download state machine.
///
/// The happy path is linear; `SeparateDownload`/`Merge` form the audio
/// repair branch and `Reencode` the codec compatibility branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    FetchingTitle,
    Downloading,
    CompatCheck,
    Reencode,
    AudioValidate,
    SeparateDownload,
    Merge,
    SubtitleInject,
    Done,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::FetchingTitle => "fetching_title",
            JobStage::Downloading => "downloading",
            JobStage::CompatCheck => "compat_check",
            JobStage::Reencode => "reencode",
            JobStage::AudioValidate => "audio_validate",
            JobStage::SeparateDownload => "separate_download",
            JobStage::Merge => "merge",
            JobStage::SubtitleInject => "subtitle_inject",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }
}

/// One end-to-end pipeline run for a single request.
///
/// The id is generated once per job, never reused, and is the only handle
/// exposed outside the process. The job itself is owned by the task running
/// the pipeline and dropped when it terminates; only the artifact persists.
#[derive(Debug)]
pub struct DownloadJob {
    pub id: Uuid,
    pub platform: Platform,
    pub canonical_url: String,
    pub title: String,
    pub stage: JobStage,
}

impl DownloadJob {
    pub fn new(canonical: CanonicalUrl) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform: canonical.platform,
            canonical_url: canonical.url,
            title: FALLBACK_TITLE.to_string(),
            stage: JobStage::FetchingTitle,
        }
    }

    /// Move to the next stage, leaving a trace of the transition.
    pub fn advance(&mut self, stage: JobStage) {
        tracing::debug!(job = %self.id, from = self.stage.as_str(), to = stage.as_str(), "stage transition");
        self.stage = stage;
    }

    pub fn display_filename(&self) -> String {
        format!("{}.mp4", self.title)
    }
}

/// Result of a successful pipeline run.
///
/// `warning` marks a degraded-but-successful outcome, e.g. the audio
/// fallback having to settle for a video-only file.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub artifact: Artifact,
    pub warning: Option<String>,
}
