// SPDX-License-Identifier: MIT
//! Session video capture.
//!
//! A background task grabs a JPEG frame from the page at a fixed cadence
//! for the whole lifetime of the session; on finish the frames are muxed
//! into an MP4 by an `ffmpeg` subprocess inside the scratch directory.

use anyhow::{bail, Context, Result};
use chrono::Local;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upper bound on the ffmpeg muxing step.
const ASSEMBLE_TIMEOUT_SECS: u64 = 60;

/// Handle for the running frame grabber.
pub(crate) struct FrameCapture {
    stop: Arc<AtomicBool>,
    task: JoinHandle<u32>,
    frames_dir: PathBuf,
    scratch_dir: PathBuf,
    frame_rate: u32,
}

impl FrameCapture {
    /// Start grabbing frames from `page` into `{scratch_dir}/frames`.
    pub(crate) fn start(page: Page, scratch_dir: PathBuf, frame_rate: u32) -> Result<Self> {
        let frames_dir = scratch_dir.join("frames");
        std::fs::create_dir_all(&frames_dir).with_context(|| {
            format!("failed to create frames dir {}", frames_dir.display())
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let interval = Duration::from_millis(1000 / u64::from(frame_rate.max(1)));

        let stop_flag = stop.clone();
        let dir = frames_dir.clone();
        let task = tokio::spawn(async move {
            let mut written: u32 = 0;
            while !stop_flag.load(Ordering::Relaxed) {
                let shot = page
                    .screenshot(
                        ScreenshotParams::builder()
                            .format(CaptureScreenshotFormat::Jpeg)
                            .full_page(false)
                            .build(),
                    )
                    .await;
                match shot {
                    Ok(bytes) => {
                        let path = dir.join(format!("frame_{:05}.jpg", written));
                        if let Err(e) = tokio::fs::write(&path, &bytes).await {
                            warn!(err = %e, "failed to write capture frame");
                        } else {
                            written += 1;
                        }
                    }
                    // Frames can fail transiently mid-navigation; skip them.
                    Err(e) => debug!(err = %e, "frame capture skipped"),
                }
                tokio::time::sleep(interval).await;
            }
            written
        });

        Ok(Self {
            stop,
            task,
            frames_dir,
            scratch_dir,
            frame_rate,
        })
    }

    /// Stop the grabber without assembling anything. Used on the session's
    /// error path so the task does not outlive the browser.
    pub(crate) fn abort(self) {
        self.stop.store(true, Ordering::Relaxed);
        self.task.abort();
    }

    /// Stop the grabber and assemble the captured frames into an MP4 in the
    /// scratch directory.
    pub(crate) async fn finish(self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        let frames = self
            .task
            .await
            .context("frame capture task panicked")?;
        if frames == 0 {
            bail!("no frames captured during the session");
        }
        debug!(frames, "assembling session video");
        assemble_video(&self.frames_dir, &self.scratch_dir, self.frame_rate).await
    }
}

/// Spawn ffmpeg to mux the numbered JPEG frames into an MP4.
async fn assemble_video(frames_dir: &Path, scratch_dir: &Path, frame_rate: u32) -> Result<()> {
    let out_path = scratch_dir.join(format!(
        "session_{}.mp4",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let pattern = frames_dir.join("frame_%05d.jpg");

    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.arg("-y")
        .args(["-framerate", &frame_rate.to_string()])
        .arg("-i")
        .arg(&pattern)
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg(&out_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .context("failed to start ffmpeg — is it installed?")?;

    let status = match timeout(Duration::from_secs(ASSEMBLE_TIMEOUT_SECS), child.wait()).await {
        Err(_elapsed) => {
            let _ = child.kill().await;
            bail!("ffmpeg did not finish within {ASSEMBLE_TIMEOUT_SECS}s");
        }
        Ok(waited) => waited.context("failed to wait for ffmpeg")?,
    };

    if !status.success() {
        bail!("ffmpeg exited with {status}");
    }
    if !out_path.exists() {
        bail!("ffmpeg reported success but produced no video file");
    }
    Ok(())
}
