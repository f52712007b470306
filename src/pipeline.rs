//! The run driver: record → analyze → report, strictly forward.
//!
//! Stage seams are traits so integration tests can substitute stubs for
//! the browser and the hosted model.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::analyst::client::Sleeper;
use crate::analyst::GeminiClient;
use crate::config::AuditConfig;
use crate::recorder::SessionRecorder;
use crate::report::{parse_evaluation, EvaluationRecord, HtmlReporter};

/// Stage 1: produce a video of a scripted visit, or nothing.
#[async_trait]
pub trait RecordSession: Send + Sync {
    async fn record(&self, url: &str) -> Result<Option<PathBuf>>;
}

/// Stage 2: turn a video file into raw structured critique text.
#[async_trait]
pub trait CritiqueVideo: Send + Sync {
    async fn analyze(&self, video: &Path) -> Result<String>;
}

#[async_trait]
impl RecordSession for SessionRecorder {
    async fn record(&self, url: &str) -> Result<Option<PathBuf>> {
        self.record_session(url).await
    }
}

#[async_trait]
impl<S: Sleeper> CritiqueVideo for GeminiClient<S> {
    async fn analyze(&self, video: &Path) -> Result<String> {
        let file = self.upload_video(video).await?;
        self.critique(&file).await
    }
}

/// Everything a successful run leaves on disk, plus the parsed record for
/// console rendering.
#[derive(Debug)]
pub struct AuditOutcome {
    pub video_path: PathBuf,
    pub json_path: PathBuf,
    pub report_path: PathBuf,
    pub record: EvaluationRecord,
}

/// Execute one audit. `Ok(None)` means the recorder produced no artifact
/// and the pipeline halted before the expensive inference stage; errors
/// from later stages propagate to the caller.
pub async fn run_audit<R, C>(
    config: &AuditConfig,
    recorder: &R,
    analyst: &C,
    url: &str,
) -> Result<Option<AuditOutcome>>
where
    R: RecordSession,
    C: CritiqueVideo,
{
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output dir {}",
            config.output_dir.display()
        )
    })?;

    info!(url, "phase 1: data collection");
    let video_path = match recorder.record(url).await? {
        Some(path) => path,
        None => {
            error!("browser failed to record video");
            return Ok(None);
        }
    };

    info!("phase 2: AI analysis");
    let raw = analyst.analyze(&video_path).await?;
    let record = parse_evaluation(&raw)?;

    info!("phase 3: reporting");
    let video_filename = video_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "session.mp4".to_string());

    let json_path = config.output_dir.join(format!(
        "{}_qa_report.json",
        video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string())
    ));
    let pretty = serde_json::to_string_pretty(&record).context("failed to serialize record")?;
    std::fs::write(&json_path, pretty)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let reporter = HtmlReporter::new(&config.output_dir);
    let report_path = reporter.generate_report(&record, &video_filename)?;

    Ok(Some(AuditOutcome {
        video_path,
        json_path,
        report_path,
        record,
    }))
}
