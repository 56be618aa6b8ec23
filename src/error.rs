// Application-wide error types

use thiserror::Error;

use crate::normalizer::Platform;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the download service.
///
/// `Validation`, `UnsupportedPlatform` and `ExtractionFailed` are
/// user-caused and map to 4xx responses; the rest are server-side.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or oversized request input (URL or artifact id).
    #[error("{0}")]
    Validation(String),

    /// The URL does not belong to any supported platform.
    #[error("Unsupported platform. Supported: YouTube, Facebook, Instagram, X/Twitter, Vimeo")]
    UnsupportedPlatform,

    /// Supported platform, but no pattern rule matched the URL.
    #[error("Could not extract valid video ID from {0} URL")]
    ExtractionFailed(Platform),

    /// An external tool (yt-dlp, ffmpeg, ffprobe) failed or timed out.
    #[error("{tool} failed: {message}")]
    ToolInvocation {
        tool: &'static str,
        message: String,
    },

    /// Artifact missing or expired at retrieval time.
    #[error("{0}")]
    NotFound(String),

    /// Artifact present but zero-length; never served.
    #[error("Downloaded file is empty")]
    EmptyArtifact,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn tool(tool: &'static str, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool,
            message: message.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
