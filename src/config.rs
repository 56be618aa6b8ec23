// Application configuration settings
//
// Everything is loaded from environment variables (a .env file is honored
// at startup) and falls back to the defaults below.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Storage root for downloaded artifacts
    pub download_dir: PathBuf,
    /// Directory for the activity audit log
    pub log_dir: PathBuf,
    /// Maximum artifact age before the sweep reclaims it
    pub max_file_age: Duration,
    /// Interval between eviction sweeps
    pub cleanup_interval: Duration,
    /// Delay before deleting an artifact after it has been served
    pub post_serve_delete_delay: Duration,
    /// Maximum accepted request URL length
    pub max_url_length: usize,
    /// Maximum accepted media file size in megabytes
    pub max_file_size_mb: u64,
    /// Timeout applied to external download/transcode processes
    pub download_timeout: Duration,
    /// Cool-down window between yt-dlp update checks
    pub ytdlp_update_check_interval: Duration,
    /// Domains accepted by request validation
    pub allowed_domains: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_root = dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("clipfetch");

        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            download_dir: data_root.join("downloads"),
            log_dir: data_root.join("logs"),
            max_file_age: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            post_serve_delete_delay: Duration::from_secs(60),
            max_url_length: 2000,
            max_file_size_mb: 500,
            download_timeout: Duration::from_secs(300),
            ytdlp_update_check_interval: Duration::from_secs(600),
            allowed_domains: [
                "youtube.com",
                "youtu.be",
                "youtube-nocookie.com",
                "facebook.com",
                "fb.watch",
                "instagram.com",
                "twitter.com",
                "x.com",
                "t.co",
                "vimeo.com",
                "vimeopro.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        let mut settings = Self::default();

        if let Some(host) = env_string("HOST") {
            settings.host = host;
        }
        if let Some(port) = env_parse("PORT") {
            settings.port = port;
        }
        if let Some(dir) = env_string("DOWNLOAD_DIR") {
            settings.download_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_string("LOG_DIR") {
            settings.log_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_parse("MAX_FILE_AGE_SECONDS") {
            settings.max_file_age = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CLEANUP_INTERVAL_SECONDS") {
            settings.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("POST_SERVE_DELETE_DELAY") {
            settings.post_serve_delete_delay = Duration::from_secs(secs);
        }
        if let Some(len) = env_parse("MAX_URL_LENGTH") {
            settings.max_url_length = len;
        }
        if let Some(mb) = env_parse("MAX_FILE_SIZE_MB") {
            settings.max_file_size_mb = mb;
        }
        if let Some(secs) = env_parse("DOWNLOAD_TIMEOUT_SECONDS") {
            settings.download_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("YTDLP_UPDATE_CHECK_INTERVAL") {
            settings.ytdlp_update_check_interval = Duration::from_secs(secs);
        }
        if let Some(domains) = env_string("ALLOWED_DOMAINS") {
            let parsed: Vec<String> = domains
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
            if !parsed.is_empty() {
                settings.allowed_domains = parsed;
            }
        }

        settings
    }

    pub fn activity_log_path(&self) -> PathBuf {
        self.log_dir.join("activity.log")
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
