// Media compatibility engine
//
// Pure decision logic over codec probe results. The target is a file that
// plays everywhere (iOS, Android, every browser): H.264 video and AAC
// audio in an MP4 container. Work is bounded to the minimum needed --
// a compliant track is copied, never re-encoded.

/// Universally playable video codecs (H.264 family only; H.265 has
/// limited Android/browser support).
const COMPATIBLE_VIDEO: &[&str] = &["h264", "avc1", "avc"];

/// Universally playable audio codecs.
const COMPATIBLE_AUDIO: &[&str] = &["aac", "mp4a"];

/// What to do with the video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoAction {
    Copy,
    Reencode,
}

/// What to do with the audio track. `Skip` means no audio stream exists
/// and none should be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioAction {
    Copy,
    Reencode,
    Skip,
}

/// Per-track transcode plan derived from a codec probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatPlan {
    pub video: VideoAction,
    pub audio: AudioAction,
}

impl CompatPlan {
    /// True when the file already plays everywhere and no re-encode pass
    /// is needed.
    pub fn is_compliant(&self) -> bool {
        self.video == VideoAction::Copy && self.audio != AudioAction::Reencode
    }
}

fn codec_in(codec: &str, whitelist: &[&str]) -> bool {
    let lower = codec.to_lowercase();
    whitelist.iter().any(|c| lower.contains(c))
}

/// Decide the minimal re-encode plan for the probed codecs.
///
/// An unreadable/absent video codec is treated as non-compliant; an absent
/// audio stream is acceptable as-is.
pub fn plan(video_codec: Option<&str>, audio_codec: Option<&str>) -> CompatPlan {
    let video = match video_codec {
        Some(codec) if codec_in(codec, COMPATIBLE_VIDEO) => VideoAction::Copy,
        _ => VideoAction::Reencode,
    };

    let audio = match audio_codec {
        None => AudioAction::Skip,
        Some(codec) if codec_in(codec, COMPATIBLE_AUDIO) => AudioAction::Copy,
        Some(_) => AudioAction::Reencode,
    };

    CompatPlan { video, audio }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compliant_file_is_untouched() {
        let plan = plan(Some("h264"), Some("aac"));
        assert_eq!(plan.video, VideoAction::Copy);
        assert_eq!(plan.audio, AudioAction::Copy);
        assert!(plan.is_compliant());
    }

    #[test]
    fn test_avc1_profile_string_counts_as_h264() {
        let plan = plan(Some("avc1.640028"), Some("mp4a.40.2"));
        assert!(plan.is_compliant());
    }

    #[test]
    fn test_vp9_video_is_reencoded_audio_copied() {
        let plan = plan(Some("vp9"), Some("aac"));
        assert_eq!(plan.video, VideoAction::Reencode);
        assert_eq!(plan.audio, AudioAction::Copy);
        assert!(!plan.is_compliant());
    }

    #[test]
    fn test_opus_audio_is_reencoded_video_copied() {
        let plan = plan(Some("h264"), Some("opus"));
        assert_eq!(plan.video, VideoAction::Copy);
        assert_eq!(plan.audio, AudioAction::Reencode);
        assert!(!plan.is_compliant());
    }

    #[test]
    fn test_missing_audio_is_acceptable() {
        let plan = plan(Some("h264"), None);
        assert_eq!(plan.audio, AudioAction::Skip);
        assert!(plan.is_compliant());
    }

    #[test]
    fn test_unreadable_video_forces_reencode() {
        let plan = plan(None, None);
        assert_eq!(plan.video, VideoAction::Reencode);
        assert!(!plan.is_compliant());
    }
}
