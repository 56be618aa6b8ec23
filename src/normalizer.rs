// URL normalization for supported video platforms
//
// Pure string-in, canonical-URL-out: no network access, no side effects.
// Platform detection is substring-based over a fixed priority list; each
// platform then tries its pattern rules top to bottom and the first match
// wins. Safe to feed arbitrary strings.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Supported source platforms, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Facebook,
    Instagram,
    Twitter,
    Vimeo,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Vimeo => "vimeo",
        }
    }

    /// Extra yt-dlp arguments for this platform.
    pub fn ytdlp_args(&self) -> &'static [&'static str] {
        match self {
            Platform::Youtube => &[],
            Platform::Facebook => &["--extractor-args", "facebook:api_version=v12.0"],
            Platform::Instagram => &[],
            Platform::Twitter => &[],
            Platform::Vimeo => &[],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized URL together with its detected platform.
///
/// Invariant: `url` always matches the canonical template for `platform`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    pub platform: Platform,
    pub url: String,
}

/// Detect the platform and reduce the URL to its canonical form.
pub fn normalize(raw_url: &str) -> Result<CanonicalUrl> {
    let raw = raw_url.trim();
    let platform = detect_platform(raw).ok_or(Error::UnsupportedPlatform)?;

    let clean = match platform {
        Platform::Youtube => clean_youtube(raw),
        Platform::Facebook => clean_facebook(raw),
        Platform::Instagram => clean_instagram(raw),
        Platform::Twitter => clean_twitter(raw),
        Platform::Vimeo => clean_vimeo(raw),
    };

    clean
        .map(|url| CanonicalUrl { platform, url })
        .ok_or(Error::ExtractionFailed(platform))
}

/// First matching domain wins; no platform is attempted twice.
fn detect_platform(url: &str) -> Option<Platform> {
    const DOMAINS: &[(Platform, &[&str])] = &[
        (
            Platform::Youtube,
            &["youtube.com", "youtu.be", "youtube-nocookie.com"],
        ),
        (Platform::Facebook, &["facebook.com", "fb.watch"]),
        (Platform::Instagram, &["instagram.com"]),
        (Platform::Twitter, &["twitter.com", "x.com", "t.co"]),
        (Platform::Vimeo, &["vimeo.com", "vimeopro.com"]),
    ];

    DOMAINS
        .iter()
        .find(|(_, domains)| domains.iter().any(|d| url.contains(d)))
        .map(|(platform, _)| *platform)
}

/// YouTube video IDs are exactly 11 characters; longer captures are
/// truncated to tolerate trailing noise, shorter ones rejected.
fn truncate_video_id(id: &str) -> Option<String> {
    if id.chars().count() >= 11 {
        Some(id.chars().take(11).collect())
    } else {
        None
    }
}

fn query_param(parsed: &Url, name: &str) -> Option<String> {
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn clean_youtube(raw: &str) -> Option<String> {
    lazy_static! {
        static ref PATH_ID: Regex =
            Regex::new(r"/(?:embed|v|e|shorts|live)/([A-Za-z0-9_-]{11})").unwrap();
    }

    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;

    let video_id = if host.contains("youtu.be") {
        // Short links carry the id as the first path segment
        let id = parsed.path().trim_matches('/');
        Some(id.split('/').next().unwrap_or(id).to_string())
    } else if host.contains("youtube.com") || host.contains("youtube-nocookie.com") {
        query_param(&parsed, "v").or_else(|| {
            PATH_ID
                .captures(parsed.path())
                .map(|c| c[1].to_string())
        })
    } else {
        None
    };

    let id = truncate_video_id(&video_id?)?;
    Some(format!("https://www.youtube.com/watch?v={}", id))
}

fn clean_facebook(raw: &str) -> Option<String> {
    lazy_static! {
        static ref REEL: Regex = Regex::new(r"/reel/(\d+)").unwrap();
        static ref SHARE: Regex = Regex::new(r"/share/([vr])/([A-Za-z0-9]+)").unwrap();
        static ref VIDEOS: Regex = Regex::new(r"/videos/(?:[^/]+/)?(\d+)").unwrap();
        static ref POSTS: Regex = Regex::new(r"/posts/(pfbid[A-Za-z0-9]+|\d+)").unwrap();
        static ref GROUPS: Regex =
            Regex::new(r"/groups/[^/]+/(?:posts|permalink)/(\d+)").unwrap();
        static ref EVENTS: Regex = Regex::new(r"/events/(\d+)").unwrap();
    }

    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;

    // fb.watch short links pass straight through to the fetch tool
    if host.contains("fb.watch") {
        return Some(raw.split('?').next().unwrap_or(raw).to_string());
    }

    if !host.contains("facebook.com") {
        return None;
    }
    let path = parsed.path();

    if let Some(c) = REEL.captures(path) {
        return Some(format!("https://www.facebook.com/reel/{}", &c[1]));
    }
    if let Some(c) = SHARE.captures(path) {
        return Some(format!("https://www.facebook.com/share/{}/{}/", &c[1], &c[2]));
    }
    if let Some(id) = query_param(&parsed, "v").or_else(|| query_param(&parsed, "video_id")) {
        return Some(format!("https://www.facebook.com/watch?v={}", id));
    }
    if let Some(id) = query_param(&parsed, "story_fbid") {
        return Some(format!("https://www.facebook.com/watch?v={}", id));
    }
    if let Some(c) = VIDEOS.captures(path) {
        return Some(format!("https://www.facebook.com/watch?v={}", &c[1]));
    }
    if let Some(c) = POSTS.captures(path) {
        return Some(format!("https://www.facebook.com/watch?v={}", &c[1]));
    }
    if let Some(c) = GROUPS.captures(path) {
        return Some(format!("https://www.facebook.com/watch?v={}", &c[1]));
    }
    if let Some(c) = EVENTS.captures(path) {
        return Some(format!("https://www.facebook.com/events/{}", &c[1]));
    }

    None
}

fn clean_instagram(raw: &str) -> Option<String> {
    lazy_static! {
        static ref STORIES: Regex =
            Regex::new(r"/stories/(?:highlights/)?([A-Za-z0-9_.\-]+)(?:/(\d+))?").unwrap();
        static ref CONTENT: Regex =
            Regex::new(r"/(?:[^/]+/)?(p|reels?|tv)/([A-Za-z0-9_-]+)").unwrap();
    }

    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    if !host.contains("instagram.com") {
        return None;
    }
    let path = parsed.path();

    if let Some(c) = STORIES.captures(path) {
        let name = &c[1];
        if let Some(story_id) = c.get(2) {
            return Some(format!(
                "https://www.instagram.com/stories/{}/{}/",
                name,
                story_id.as_str()
            ));
        }
        if name == "highlights" || name.chars().all(|ch| ch.is_ascii_digit()) {
            return Some(format!("https://www.instagram.com/stories/highlights/{}/", name));
        }
    }

    if let Some(c) = CONTENT.captures(path) {
        // 'reels' is an alias of 'reel'
        let kind = if &c[1] == "reels" { "reel" } else { &c[1] };
        return Some(format!("https://www.instagram.com/{}/{}/", kind, &c[2]));
    }

    None
}

fn clean_twitter(raw: &str) -> Option<String> {
    lazy_static! {
        static ref STATUS: Regex = Regex::new(r"/(?:status|statuses)/(\d+)").unwrap();
        static ref BROADCAST: Regex = Regex::new(r"/i/broadcasts/(\w+)").unwrap();
        static ref SPACES: Regex = Regex::new(r"/i/spaces/([0-9a-zA-Z]+)").unwrap();
    }

    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;

    // t.co shortener resolves at fetch time
    if host.contains("t.co") {
        return Some(raw.to_string());
    }

    if !(host.contains("twitter.com") || host.contains("x.com")) {
        return None;
    }
    let path = parsed.path();

    if let Some(c) = STATUS.captures(path) {
        return Some(format!("https://x.com/i/status/{}", &c[1]));
    }
    if let Some(c) = BROADCAST.captures(path) {
        return Some(format!("https://x.com/i/broadcasts/{}", &c[1]));
    }
    if let Some(c) = SPACES.captures(path) {
        return Some(format!("https://x.com/i/spaces/{}", &c[1]));
    }

    None
}

fn clean_vimeo(raw: &str) -> Option<String> {
    lazy_static! {
        static ref ONDEMAND: Regex = Regex::new(r"/ondemand/[^/]+/(\d+)").unwrap();
        static ref REVIEW: Regex = Regex::new(r"/review/(\d+)/([a-f0-9]+)").unwrap();
        static ref EVENT: Regex = Regex::new(r"/event/(\d+)").unwrap();
        static ref COLLECTION: Regex = Regex::new(r"/(album|showcase)/(\d+)").unwrap();
        static ref VIDEO: Regex = Regex::new(r"/(\d+)(?:/([a-f0-9]+))?(?:\?|$|/)").unwrap();
        static ref PRO_VIDEO: Regex = Regex::new(r"/video/(\d+)").unwrap();
    }

    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;

    if host.contains("vimeo.com") {
        let path = parsed.path();

        if let Some(c) = ONDEMAND.captures(path) {
            return Some(format!("https://vimeo.com/{}", &c[1]));
        }
        if let Some(c) = REVIEW.captures(path) {
            return Some(format!("https://vimeo.com/{}/{}", &c[1], &c[2]));
        }
        if let Some(c) = EVENT.captures(path) {
            return Some(format!("https://vimeo.com/event/{}", &c[1]));
        }
        if let Some(c) = COLLECTION.captures(path) {
            return Some(format!("https://vimeo.com/{}/{}", &c[1], &c[2]));
        }
        // Bare numeric id, optionally followed by an unlisted hash; the
        // trailing slash makes end-of-path matching uniform
        let padded = format!("{}/", path);
        if let Some(c) = VIDEO.captures(&padded) {
            return match c.get(2) {
                Some(hash) => Some(format!("https://vimeo.com/{}/{}", &c[1], hash.as_str())),
                None => Some(format!("https://vimeo.com/{}", &c[1])),
            };
        }
    }

    if host.contains("vimeopro.com") {
        if let Some(c) = PRO_VIDEO.captures(parsed.path()) {
            return Some(format!("https://vimeo.com/{}", &c[1]));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(url: &str) -> String {
        normalize(url).expect("should normalize").url
    }

    #[test]
    fn test_youtube_short_link() {
        let result = normalize("https://youtu.be/dQw4w9WgXcQ?feature=share").unwrap();
        assert_eq!(result.platform, Platform::Youtube);
        assert_eq!(result.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_youtube_watch_and_variants() {
        assert_eq!(
            canonical("https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            canonical("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            canonical("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_youtube_id_truncated_not_rejected() {
        // Trailing noise after the 11-char id is dropped
        assert_eq!(
            canonical("https://youtu.be/dQw4w9WgXcQxyz"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_youtube_short_id_rejected() {
        let err = normalize("https://youtu.be/short").unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(Platform::Youtube)));
    }

    #[test]
    fn test_facebook_rule_priority() {
        // reel path outranks everything else
        assert_eq!(
            canonical("https://www.facebook.com/reel/1234567890?mibextid=xyz"),
            "https://www.facebook.com/reel/1234567890"
        );
        assert_eq!(
            canonical("https://www.facebook.com/share/v/AbC123/"),
            "https://www.facebook.com/share/v/AbC123/"
        );
        assert_eq!(
            canonical("https://www.facebook.com/watch?v=987654321"),
            "https://www.facebook.com/watch?v=987654321"
        );
        assert_eq!(
            canonical("https://www.facebook.com/story.php?story_fbid=111222333&id=4"),
            "https://www.facebook.com/watch?v=111222333"
        );
        assert_eq!(
            canonical("https://www.facebook.com/someuser/videos/555666777"),
            "https://www.facebook.com/watch?v=555666777"
        );
        assert_eq!(
            canonical("https://www.facebook.com/someuser/posts/pfbid0abcDEF"),
            "https://www.facebook.com/watch?v=pfbid0abcDEF"
        );
        assert_eq!(
            canonical("https://www.facebook.com/groups/cooking/posts/42424242"),
            "https://www.facebook.com/watch?v=42424242"
        );
        assert_eq!(
            canonical("https://www.facebook.com/events/314159265"),
            "https://www.facebook.com/events/314159265"
        );
    }

    #[test]
    fn test_fb_watch_passthrough() {
        assert_eq!(
            canonical("https://fb.watch/abcDEF123/?mibextid=qC1gEa"),
            "https://fb.watch/abcDEF123/"
        );
    }

    #[test]
    fn test_instagram_reels_alias() {
        let result = normalize("https://www.instagram.com/reels/Cabc123XYZ/").unwrap();
        assert_eq!(result.platform, Platform::Instagram);
        assert_eq!(result.url, "https://www.instagram.com/reel/Cabc123XYZ/");
    }

    #[test]
    fn test_instagram_post_with_username_prefix() {
        assert_eq!(
            canonical("https://www.instagram.com/someuser/reel/Cabc123XYZ/"),
            "https://www.instagram.com/reel/Cabc123XYZ/"
        );
        assert_eq!(
            canonical("https://www.instagram.com/p/Cpost456/?igsh=track"),
            "https://www.instagram.com/p/Cpost456/"
        );
    }

    #[test]
    fn test_instagram_stories() {
        assert_eq!(
            canonical("https://www.instagram.com/stories/someuser/3141592653589/"),
            "https://www.instagram.com/stories/someuser/3141592653589/"
        );
        assert_eq!(
            canonical("https://www.instagram.com/stories/highlights/17900000000000000/"),
            "https://www.instagram.com/stories/highlights/17900000000000000/"
        );
    }

    #[test]
    fn test_twitter_status_forms() {
        let result = normalize("https://twitter.com/someone/status/1234567890123").unwrap();
        assert_eq!(result.platform, Platform::Twitter);
        assert_eq!(result.url, "https://x.com/i/status/1234567890123");

        assert_eq!(
            canonical("https://x.com/i/web/status/1234567890123/video/1"),
            "https://x.com/i/status/1234567890123"
        );
        assert_eq!(
            canonical("https://twitter.com/i/spaces/1abcDEFgh"),
            "https://x.com/i/spaces/1abcDEFgh"
        );
    }

    #[test]
    fn test_tco_passthrough() {
        assert_eq!(canonical("https://t.co/AbCdEf"), "https://t.co/AbCdEf");
    }

    #[test]
    fn test_vimeo_basic() {
        let result = normalize("https://vimeo.com/76979871").unwrap();
        assert_eq!(result.platform, Platform::Vimeo);
        assert_eq!(result.url, "https://vimeo.com/76979871");
    }

    #[test]
    fn test_vimeo_variants() {
        assert_eq!(
            canonical("https://player.vimeo.com/video/76979871"),
            "https://vimeo.com/76979871"
        );
        assert_eq!(
            canonical("https://vimeo.com/76979871/abcdef0123"),
            "https://vimeo.com/76979871/abcdef0123"
        );
        assert_eq!(
            canonical("https://vimeo.com/channels/staffpicks/76979871"),
            "https://vimeo.com/76979871"
        );
        assert_eq!(
            canonical("https://vimeo.com/ondemand/somefilm/123456789"),
            "https://vimeo.com/123456789"
        );
        assert_eq!(
            canonical("https://vimeo.com/showcase/7008490"),
            "https://vimeo.com/showcase/7008490"
        );
        assert_eq!(
            canonical("https://vimeopro.com/user/project/video/123456789"),
            "https://vimeo.com/123456789"
        );
    }

    #[test]
    fn test_unsupported_platform() {
        let err = normalize("https://example.com/video").unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform));
    }

    #[test]
    fn test_supported_domain_without_match() {
        let err = normalize("https://www.facebook.com/marketplace/").unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(Platform::Facebook)));
    }

    #[test]
    fn test_idempotent_and_fixed_point() {
        let inputs = [
            "https://youtu.be/dQw4w9WgXcQ?feature=share",
            "https://www.instagram.com/reels/Cabc123XYZ/",
            "https://twitter.com/someone/status/1234567890123",
            "https://vimeo.com/76979871",
            "https://www.facebook.com/watch?v=987654321",
        ];
        for input in inputs {
            let first = normalize(input).unwrap();
            let second = normalize(input).unwrap();
            assert_eq!(first, second, "idempotence for {}", input);

            // Re-feeding a canonical URL must yield itself
            let refed = normalize(&first.url).unwrap();
            assert_eq!(refed.url, first.url, "fixed point for {}", input);
            assert_eq!(refed.platform, first.platform);
        }
    }

    #[test]
    fn test_arbitrary_garbage_is_safe() {
        for garbage in [
            "",
            "not a url",
            "https://",
            "youtube.com",
            "https://youtube.com/watch?v=",
            "ftp://vimeo.com/123",
            "https://instagram.com/\u{202e}weird",
        ] {
            // Must never panic; any Err is acceptable
            let _ = normalize(garbage);
        }
    }
}
