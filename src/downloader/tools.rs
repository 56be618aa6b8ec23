// External tool gateway
//
// Thin call contract over the two opaque collaborators: yt-dlp (fetch) and
// ffmpeg/ffprobe (inspect, transcode, merge). Each invocation is a command
// template; the tools themselves are black boxes. Every call suspends until
// the subprocess exits, bounded by a timeout.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::compat::{AudioAction, CompatPlan, VideoAction};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::normalizer::Platform;

/// Timeout for cheap metadata operations (probes, title fetch).
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Video/audio codec names reported by the inspector, if the respective
/// stream exists and could be read.
#[derive(Debug, Clone, Default)]
pub struct CodecProbe {
    pub video: Option<String>,
    pub audio: Option<String>,
}

/// Operations the pipeline needs from the external tools.
#[async_trait]
pub trait MediaToolGateway: Send + Sync {
    /// Fetch the media title. Errors are expected and non-fatal upstream.
    async fn probe_title(&self, url: &str, platform: Platform) -> Result<String>;

    /// Primary combined download: best video + best audio, resolution
    /// preferred, merged into an MP4 at `output_template` (a yt-dlp `-o`
    /// template containing `%(ext)s`).
    async fn download_combined(
        &self,
        url: &str,
        platform: Platform,
        output_template: &str,
    ) -> Result<()>;

    /// Download a single elementary stream selected by `selector` to an
    /// exact output path. Used by the audio-repair fallback.
    async fn download_stream(
        &self,
        url: &str,
        platform: Platform,
        selector: &str,
        output: &Path,
    ) -> Result<()>;

    /// Codec names of the first video/audio streams.
    async fn probe_codecs(&self, path: &Path) -> Result<CodecProbe>;

    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Whether a selectable audio stream exists at all.
    async fn has_audio_stream(&self, path: &Path) -> Result<bool>;

    /// Whether the audio track is silent by loudness analysis.
    async fn is_audio_silent(&self, path: &Path) -> Result<bool>;

    /// Re-encode `input` into `output` per the compatibility plan.
    async fn transcode(&self, input: &Path, output: &Path, plan: &CompatPlan) -> Result<()>;

    /// Merge separately downloaded video and audio tracks. Always
    /// re-encodes: divergent-source merges are not guaranteed
    /// container-compatible with a stream copy.
    async fn merge_tracks(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;

    /// Mux `subtitle` into `input` as a toggleable mov_text track.
    async fn inject_subtitle(&self, input: &Path, subtitle: &Path, output: &Path) -> Result<()>;
}

/// Gateway implementation that shells out to the real tools.
pub struct CommandGateway {
    download_timeout: Duration,
    max_file_size_mb: u64,
}

impl CommandGateway {
    pub fn new(settings: &Settings) -> Self {
        Self {
            download_timeout: settings.download_timeout,
            max_file_size_mb: settings.max_file_size_mb,
        }
    }
}

/// Run a command to completion with a timeout; the child is killed if the
/// timeout fires.
async fn run_with_timeout(
    program: &'static str,
    args: &[String],
    timeout: Duration,
) -> Result<Output> {
    let child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::tool(program, format!("failed to start: {}", e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| Error::tool(program, e.to_string())),
        Err(_) => Err(Error::tool(
            program,
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

/// Like `run_with_timeout`, but a non-zero exit becomes an error carrying
/// the tool's stderr.
async fn run_checked(
    program: &'static str,
    args: &[String],
    timeout: Duration,
) -> Result<Output> {
    let output = run_with_timeout(program, args, timeout).await?;
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::tool(program, stderr.trim().to_string()))
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// The loudness pass reports this floor for digitally silent tracks.
fn reports_silence(volumedetect_output: &str) -> bool {
    volumedetect_output.contains("mean_volume: -91.0 dB")
        || volumedetect_output.contains("max_volume: -91.0 dB")
}

#[async_trait]
impl MediaToolGateway for CommandGateway {
    async fn probe_title(&self, url: &str, platform: Platform) -> Result<String> {
        let mut cmd = args(&["--print", "%(title)s", "--no-playlist"]);
        cmd.extend(args(platform.ytdlp_args()));
        cmd.push(url.to_string());

        let output = run_checked("yt-dlp", &cmd, PROBE_TIMEOUT).await?;
        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() {
            return Err(Error::tool("yt-dlp", "empty title".to_string()));
        }
        Ok(title)
    }

    async fn download_combined(
        &self,
        url: &str,
        platform: Platform,
        output_template: &str,
    ) -> Result<()> {
        let mut cmd = args(&[
            // Best quality, handling both horizontal and vertical videos
            "-f",
            "bestvideo+bestaudio/best",
            "--format-sort",
            "res,vcodec,acodec",
            "--merge-output-format",
            "mp4",
            "-o",
        ]);
        cmd.push(output_template.to_string());
        cmd.extend(args(&[
            "--restrict-filenames",
            "--no-playlist",
            "--add-metadata",
            "--newline",
            "--progress",
            "--retries",
            "3",
            "--socket-timeout",
            "30",
            "--max-filesize",
        ]));
        cmd.push(format!("{}M", self.max_file_size_mb));
        cmd.extend(args(platform.ytdlp_args()));
        cmd.push(url.to_string());

        run_checked("yt-dlp", &cmd, self.download_timeout).await?;
        Ok(())
    }

    async fn download_stream(
        &self,
        url: &str,
        platform: Platform,
        selector: &str,
        output: &Path,
    ) -> Result<()> {
        let mut cmd = args(&["-f"]);
        cmd.push(selector.to_string());
        cmd.push("-o".to_string());
        cmd.push(output.to_string_lossy().to_string());
        cmd.push("--no-playlist".to_string());
        cmd.extend(args(platform.ytdlp_args()));
        cmd.push(url.to_string());

        run_checked("yt-dlp", &cmd, self.download_timeout).await?;
        Ok(())
    }

    async fn probe_codecs(&self, path: &Path) -> Result<CodecProbe> {
        let mut probe = CodecProbe::default();
        for (stream, slot) in [("v:0", &mut probe.video), ("a:0", &mut probe.audio)] {
            let cmd = args(&[
                "-v",
                "error",
                "-select_streams",
                stream,
                "-show_entries",
                "stream=codec_name",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                &path.to_string_lossy(),
            ]);
            let output = run_with_timeout("ffprobe", &cmd, PROBE_TIMEOUT).await?;
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !name.is_empty() {
                    *slot = Some(name);
                }
            }
        }
        Ok(probe)
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let cmd = args(&[
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            &path.to_string_lossy(),
        ]);
        let output = run_checked("ffprobe", &cmd, PROBE_TIMEOUT).await?;
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|e| Error::tool("ffprobe", format!("unparseable duration: {}", e)))
    }

    async fn has_audio_stream(&self, path: &Path) -> Result<bool> {
        let cmd = args(&[
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            &path.to_string_lossy(),
        ]);
        let output = run_with_timeout("ffprobe", &cmd, PROBE_TIMEOUT).await?;
        Ok(output.status.success()
            && !String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    async fn is_audio_silent(&self, path: &Path) -> Result<bool> {
        let cmd = args(&[
            "-i",
            &path.to_string_lossy(),
            "-af",
            "volumedetect",
            "-f",
            "null",
            "-",
        ]);
        // volumedetect decodes the whole track, so the short probe timeout
        // does not apply here
        let output = run_checked("ffmpeg", &cmd, self.download_timeout).await?;
        Ok(reports_silence(&String::from_utf8_lossy(&output.stderr)))
    }

    async fn transcode(&self, input: &Path, output: &Path, plan: &CompatPlan) -> Result<()> {
        let mut cmd = args(&["-y", "-i", &input.to_string_lossy()]);
        match plan.video {
            VideoAction::Reencode => {
                cmd.extend(args(&["-c:v", "libx264", "-preset", "fast", "-crf", "23"]))
            }
            VideoAction::Copy => cmd.extend(args(&["-c:v", "copy"])),
        }
        match plan.audio {
            AudioAction::Reencode => cmd.extend(args(&["-c:a", "aac", "-b:a", "128k"])),
            AudioAction::Copy => cmd.extend(args(&["-c:a", "copy"])),
            AudioAction::Skip => {}
        }
        cmd.extend(args(&["-movflags", "+faststart"]));
        cmd.push(output.to_string_lossy().to_string());

        run_checked("ffmpeg", &cmd, self.download_timeout).await?;
        Ok(())
    }

    async fn merge_tracks(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let cmd = args(&[
            "-i",
            &video.to_string_lossy(),
            "-i",
            &audio.to_string_lossy(),
            "-c:v",
            "libx264",
            "-preset",
            "fast",
            "-crf",
            "23",
            "-c:a",
            "aac",
            "-movflags",
            "+faststart",
            &output.to_string_lossy(),
        ]);
        run_checked("ffmpeg", &cmd, self.download_timeout).await?;
        Ok(())
    }

    async fn inject_subtitle(&self, input: &Path, subtitle: &Path, output: &Path) -> Result<()> {
        let cmd = args(&[
            "-y",
            "-i",
            &input.to_string_lossy(),
            "-i",
            &subtitle.to_string_lossy(),
            "-c:v",
            "copy",
            "-c:a",
            "copy",
            "-c:s",
            "mov_text",
            "-metadata:s:s:0",
            "language=eng",
            "-metadata:s:s:0",
            "title=Source URL",
            &output.to_string_lossy(),
        ]);
        run_checked("ffmpeg", &cmd, self.download_timeout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_markers() {
        let silent = "[Parsed_volumedetect_0 @ 0x1] mean_volume: -91.0 dB\n\
                      [Parsed_volumedetect_0 @ 0x1] max_volume: -91.0 dB";
        assert!(reports_silence(silent));

        let audible = "[Parsed_volumedetect_0 @ 0x1] mean_volume: -23.4 dB\n\
                       [Parsed_volumedetect_0 @ 0x1] max_volume: -5.1 dB";
        assert!(!reports_silence(audible));
    }

    #[test]
    fn test_run_with_timeout_reports_missing_binary() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(run_with_timeout(
                "definitely-not-a-real-binary",
                &[],
                Duration::from_secs(1),
            ))
            .unwrap_err();
        match err {
            Error::ToolInvocation { tool, .. } => {
                assert_eq!(tool, "definitely-not-a-real-binary")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
