// yt-dlp self-update with a process-wide throttle
//
// Platforms break their internals constantly and yt-dlp ships fixes almost
// daily, so the tool is upgraded through its package manager before use.
// At most one check runs at a time across all jobs; checks inside the
// cool-down window are silently skipped.

use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Single point of truth for "is an update check already running".
pub struct ToolUpdater {
    interval: Duration,
    state: Mutex<UpdateState>,
}

#[derive(Default)]
struct UpdateState {
    last_check: Option<Instant>,
    in_progress: bool,
}

/// Whether a check should run given the throttle state.
fn should_check(last_check: Option<Instant>, interval: Duration, force: bool) -> bool {
    if force {
        return true;
    }
    match last_check {
        Some(at) => at.elapsed() >= interval,
        None => true,
    }
}

impl ToolUpdater {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(UpdateState::default()),
        }
    }

    /// Check for and install a yt-dlp update. `force` bypasses the
    /// time-based throttle (used once at startup).
    pub async fn check(&self, force: bool) {
        {
            let mut state = self.state.lock().await;
            if !should_check(state.last_check, self.interval, force) {
                debug!("skipping yt-dlp update check (within cool-down window)");
                return;
            }
            if state.in_progress {
                debug!("yt-dlp update already in progress, skipping");
                return;
            }
            state.in_progress = true;
        }

        info!("checking for yt-dlp updates...");
        let result = Command::new("pip3")
            .args(["install", "--upgrade", "--no-cache-dir", "yt-dlp"])
            .output()
            .await;

        let mut state = self.state.lock().await;
        state.in_progress = false;

        match result {
            Ok(output) => {
                state.last_check = Some(Instant::now());
                if output.status.success() {
                    report_upgrade_output(&String::from_utf8_lossy(&output.stdout));
                } else {
                    warn!(
                        "failed to update yt-dlp: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
            }
            Err(e) => warn!("error checking for yt-dlp updates: {}", e),
        }
    }
}

fn report_upgrade_output(stdout: &str) {
    lazy_static! {
        static ref VERSION: Regex = Regex::new(r"yt-dlp-([\d.]+)").unwrap();
    }

    if stdout.contains("Successfully installed") {
        match VERSION.captures(stdout) {
            Some(c) => info!("yt-dlp updated to version {}", &c[1]),
            None => info!("yt-dlp updated successfully"),
        }
    } else if stdout.contains("Requirement already satisfied") {
        info!("yt-dlp is already up to date");
    } else {
        info!("yt-dlp check completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_check_always_runs() {
        assert!(should_check(None, Duration::from_secs(600), false));
    }

    #[test]
    fn test_recent_check_is_throttled() {
        let just_now = Some(Instant::now());
        assert!(!should_check(just_now, Duration::from_secs(600), false));
    }

    #[test]
    fn test_force_bypasses_throttle() {
        let just_now = Some(Instant::now());
        assert!(should_check(just_now, Duration::from_secs(600), true));
    }

    #[test]
    fn test_stale_check_runs_again() {
        let long_ago = Instant::now().checked_sub(Duration::from_secs(700));
        assert!(should_check(long_ago, Duration::from_secs(600), false));
    }
}
