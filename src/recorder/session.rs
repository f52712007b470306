// SPDX-License-Identifier: MIT
//! Scripted browser session: navigate, dismiss interstitials, simulate a
//! human visitor, scroll to the bottom, and keep the video.

use anyhow::{bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::Page;
use chrono::Local;
use futures_util::StreamExt;
use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::RecorderConfig;
use crate::recorder::capture::FrameCapture;
use crate::recorder::stealth;

/// Consent/continue affordances tried in order, matched case-insensitively
/// against visible control text.
const CONSENT_TEXTS: &[&str] = &["Accept", "Accept All", "Allow", "I Agree", "Got it", "Consent"];

/// Storefront interstitial ("Continue shopping" walls) checked after the
/// consent vocabulary.
const BARRIER_TEXT: &str = "Continue shopping";

/// What happened when we went looking for an interstitial.
///
/// Never propagated as an error: all three outcomes leave the session
/// running. Logged so the absence of a banner and a failed dismissal
/// attempt stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DismissOutcome {
    /// A matching control was found and clicked.
    Clicked { label: String },
    /// No control matched any known text.
    NotFound,
    /// Lookup or click blew up (page navigated away, detached frame, ...).
    Failed { reason: String },
}

/// Records a scripted visit to one URL as a video file.
pub struct SessionRecorder {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    config: RecorderConfig,
}

impl SessionRecorder {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            scratch_dir: scratch_dir.into(),
            config,
        }
    }

    /// Record a session. `Ok(None)` means the session failed and was logged;
    /// callers must treat that as "no artifact", not retry.
    pub async fn record_session(&self, url: &str) -> Result<Option<PathBuf>> {
        info!(url, "starting browser session");
        let final_path = self.output_dir.join(video_file_name(url));

        match self.run_session(url).await {
            Ok(()) => finalize_artifact(&self.scratch_dir, &final_path),
            Err(e) => {
                error!("browser session failed: {e:#}");
                if let Err(e) = std::fs::remove_dir_all(&self.scratch_dir) {
                    debug!(err = %e, "scratch dir cleanup after failure");
                }
                Ok(None)
            }
        }
    }

    async fn run_session(&self, url: &str) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create output dir {}", self.output_dir.display())
        })?;
        std::fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!("failed to create scratch dir {}", self.scratch_dir.display())
        })?;

        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .context("failed to launch headless browser")?;

        // CDP message pump: runs until the browser connection drops.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler event loop ended");
                    break;
                }
            }
        });

        let drive_result = self.drive(&browser, url).await;

        // Best-effort close in both paths.
        if let Err(e) = browser.close().await {
            warn!(err = %e, "error closing browser");
        }
        handler_task.abort();

        drive_result
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .build()
            .map_err(|e| anyhow::anyhow!(e))
            .context("failed to build browser config")
    }

    async fn drive(&self, browser: &Browser, url: &str) -> Result<()> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        self.apply_emulation(&page).await?;
        stealth::apply(&page).await?;

        let capture = FrameCapture::start(
            page.clone(),
            self.scratch_dir.clone(),
            self.config.frame_rate,
        )?;

        match self.interact(&page, url).await {
            Ok(()) => capture.finish().await,
            Err(e) => {
                capture.abort();
                Err(e)
            }
        }
    }

    /// The scripted visit itself: navigate, settle, dismiss, scroll.
    async fn interact(&self, page: &Page, url: &str) -> Result<()> {
        info!("navigating (stealth mode on)");
        match timeout(
            Duration::from_secs(self.config.nav_timeout_secs),
            page.goto(url),
        )
        .await
        {
            Err(_elapsed) => bail!(
                "navigation timed out after {}s",
                self.config.nav_timeout_secs
            ),
            Ok(nav) => {
                nav.context("navigation failed")?;
            }
        }
        sleep(Duration::from_millis(self.config.settle_ms)).await;

        let outcome = self.dismiss_interstitials(page).await;
        match &outcome {
            DismissOutcome::Clicked { label } => info!(label = %label, "dismissed interstitial"),
            DismissOutcome::NotFound => debug!("no interstitial found"),
            DismissOutcome::Failed { reason } => {
                warn!(reason = %reason, "interstitial dismissal failed — continuing")
            }
        }

        self.pointer_burst(page).await;
        self.smooth_scroll(page).await?;
        sleep(Duration::from_millis(self.config.tail_ms)).await;
        Ok(())
    }

    async fn apply_emulation(&self, page: &Page) -> Result<()> {
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(self.config.viewport_width))
                .height(i64::from(self.config.viewport_height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| anyhow::anyhow!(e))?,
        )
        .await
        .context("failed to set viewport")?;

        page.execute(
            SetUserAgentOverrideParams::builder()
                .user_agent(self.config.user_agent.clone())
                .build()
                .map_err(|e| anyhow::anyhow!(e))?,
        )
        .await
        .context("failed to set user agent")?;

        page.execute(SetTimezoneOverrideParams {
            timezone_id: self.config.timezone.clone(),
        })
        .await
        .context("failed to set timezone")?;

        page.execute(SetLocaleOverrideParams {
            locale: Some(self.config.locale.clone()),
        })
        .await
        .context("failed to set locale")?;

        Ok(())
    }

    /// Try the consent vocabulary in order, then the storefront barrier.
    async fn dismiss_interstitials(&self, page: &Page) -> DismissOutcome {
        debug!("checking for popups/barriers");
        for text in CONSENT_TEXTS {
            match find_visible_center(page, text).await {
                Ok(Some(point)) => {
                    return match click_at(page, point).await {
                        Ok(()) => DismissOutcome::Clicked {
                            label: (*text).to_string(),
                        },
                        Err(e) => DismissOutcome::Failed {
                            reason: format!("{e:#}"),
                        },
                    };
                }
                Ok(None) => continue,
                Err(e) => {
                    return DismissOutcome::Failed {
                        reason: format!("{e:#}"),
                    }
                }
            }
        }

        match find_visible_center(page, BARRIER_TEXT).await {
            Ok(Some(point)) => match click_at(page, point).await {
                Ok(()) => {
                    // Barrier pages reload after the click.
                    sleep(Duration::from_millis(2000)).await;
                    DismissOutcome::Clicked {
                        label: BARRIER_TEXT.to_string(),
                    }
                }
                Err(e) => DismissOutcome::Failed {
                    reason: format!("{e:#}"),
                },
            },
            Ok(None) => DismissOutcome::NotFound,
            Err(e) => DismissOutcome::Failed {
                reason: format!("{e:#}"),
            },
        }
    }

    /// A short burst of randomized pointer movement. Anti-detection signal
    /// only; failures are swallowed.
    async fn pointer_burst(&self, page: &Page) {
        for _ in 0..3 {
            let (x, y, pause_ms) = {
                let mut rng = rand::rng();
                (
                    rng.random_range(100.0..1000.0),
                    rng.random_range(100.0..800.0),
                    rng.random_range(100..=300u64),
                )
            };
            if let Err(e) = move_pointer(page, x, y).await {
                debug!(err = %e, "pointer move failed");
                return;
            }
            sleep(Duration::from_millis(pause_ms)).await;
        }
    }

    /// Open-loop scroll: total height divided into equal hops over the
    /// configured wall-clock duration. Does not verify that lazy-loaded
    /// content actually rendered.
    async fn smooth_scroll(&self, page: &Page) -> Result<()> {
        info!("starting smooth scroll");
        let total_height = page
            .evaluate("document.body.scrollHeight")
            .await
            .context("failed to read page height")?
            .into_value::<f64>()
            .unwrap_or(0.0);

        let steps = self.config.scroll_steps.max(1);
        let viewport = f64::from(self.config.viewport_height);
        let step_height = (total_height - viewport).max(0.0) / f64::from(steps);
        let delay =
            Duration::from_millis(self.config.scroll_duration_secs * 1000 / u64::from(steps));

        for i in 0..steps {
            let next_y = step_height * f64::from(i + 1);
            page.evaluate(format!("window.scrollTo(0, {next_y})"))
                .await
                .context("scroll step failed")?;

            if i % self.config.pointer_burst_every.max(1) == 0 {
                self.pointer_burst(page).await;
            }
            sleep(delay).await;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ClickPoint {
    x: f64,
    y: f64,
}

/// Locate the first visible clickable control whose text contains `needle`
/// (case-insensitive) and return its center in viewport coordinates.
async fn find_visible_center(page: &Page, needle: &str) -> Result<Option<ClickPoint>> {
    let script = format!(
        r#"(() => {{
            const needle = {needle:?}.toLowerCase();
            const nodes = document.querySelectorAll('button, [role="button"], a, input[type="submit"]');
            for (const el of nodes) {{
                const text = (el.innerText || el.value || '').trim().toLowerCase();
                if (!text.includes(needle)) continue;
                const rect = el.getBoundingClientRect();
                if (rect.width < 1 || rect.height < 1) continue;
                return JSON.stringify({{ x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 }});
            }}
            return null;
        }})()"#
    );
    let found = page
        .evaluate(script)
        .await
        .context("interstitial lookup failed")?
        .into_value::<Option<String>>()
        .unwrap_or(None);
    match found {
        Some(json) => Ok(Some(
            serde_json::from_str(&json).context("bad interstitial lookup result")?,
        )),
        None => Ok(None),
    }
}

/// Native click: move, press, release at the given coordinates.
async fn click_at(page: &Page, point: ClickPoint) -> Result<()> {
    move_pointer(page, point.x, point.y).await?;

    page.execute(
        DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(point.x)
            .y(point.y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| anyhow::anyhow!(e))?,
    )
    .await
    .context("mouse press failed")?;

    page.execute(
        DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(point.x)
            .y(point.y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| anyhow::anyhow!(e))?,
    )
    .await
    .context("mouse release failed")?;

    Ok(())
}

async fn move_pointer(page: &Page, x: f64, y: f64) -> Result<()> {
    page.execute(
        DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(|e| anyhow::anyhow!(e))?,
    )
    .await
    .context("mouse move failed")?;
    Ok(())
}

/// Deterministic, collision-resistant video name derived from the target
/// host and a timestamp.
pub fn video_file_name(url: &str) -> String {
    let host = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()
        .unwrap_or_default();
    let safe: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let safe = if safe.is_empty() {
        "site".to_string()
    } else {
        safe
    };
    format!("{}_{}.mp4", safe, Local::now().format("%Y%m%d_%H%M%S"))
}

/// Move the newest video out of the scratch directory to its final name and
/// remove the scratch directory.
///
/// No video in scratch is a soft failure: `Ok(None)`, scratch still removed.
pub fn finalize_artifact(scratch_dir: &Path, final_path: &Path) -> Result<Option<PathBuf>> {
    let result = match newest_video(scratch_dir) {
        None => {
            warn!(dir = %scratch_dir.display(), "no video file produced");
            None
        }
        Some(video) => {
            std::fs::rename(&video, final_path).with_context(|| {
                format!(
                    "failed to move {} to {}",
                    video.display(),
                    final_path.display()
                )
            })?;
            info!(path = %final_path.display(), "recording complete");
            Some(final_path.to_path_buf())
        }
    };

    if let Err(e) = std::fs::remove_dir_all(scratch_dir) {
        debug!(err = %e, "scratch dir cleanup");
    }
    Ok(result)
}

fn newest_video(dir: &Path) -> Option<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_video = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("mp4") | Some("webm")
        );
        if !is_video {
            continue;
        }
        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        if newest.as_ref().map(|(t, _)| mtime > *t).unwrap_or(true) {
            newest = Some((mtime, path));
        }
    }
    newest.map(|(_, p)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_name_strips_scheme_and_www() {
        let name = video_file_name("https://www.example.com/some/page");
        assert!(name.starts_with("example.com_"), "got {name}");
        assert!(name.ends_with(".mp4"));

        let name = video_file_name("http://sub.shop.net");
        assert!(name.starts_with("sub.shop.net_"));
    }

    #[test]
    fn video_name_sanitizes_odd_hosts() {
        let name = video_file_name("https://exa mple:8080/x");
        assert!(!name.contains(' ') && !name.contains(':'), "got {name}");
    }

    #[test]
    fn finalize_moves_newest_video_and_removes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("temp_video");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("ignored.txt"), b"x").unwrap();
        std::fs::write(scratch.join("session_a.mp4"), b"video-bytes").unwrap();

        let final_path = dir.path().join("example.com_20260101_000000.mp4");
        let result = finalize_artifact(&scratch, &final_path).unwrap();

        assert_eq!(result.as_deref(), Some(final_path.as_path()));
        assert!(final_path.exists());
        assert!(!scratch.exists(), "scratch dir should be removed");
        assert_eq!(std::fs::read(&final_path).unwrap(), b"video-bytes");
    }

    #[test]
    fn finalize_with_empty_scratch_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("temp_video");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("frames.log"), b"not a video").unwrap();

        let final_path = dir.path().join("x.mp4");
        let result = finalize_artifact(&scratch, &final_path).unwrap();

        assert!(result.is_none());
        assert!(!final_path.exists());
        assert!(!scratch.exists(), "scratch dir removed even without video");
    }

    #[test]
    fn finalize_with_missing_scratch_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("never_created");
        let result = finalize_artifact(&scratch, &dir.path().join("x.mp4")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn dismiss_outcome_is_comparable() {
        assert_eq!(DismissOutcome::NotFound, DismissOutcome::NotFound);
        assert_ne!(
            DismissOutcome::NotFound,
            DismissOutcome::Clicked {
                label: "Accept".into()
            }
        );
    }
}
