//! End-to-end pipeline tests with stubbed record/critique stages.
//!
//! The browser and the hosted model are external collaborators; these
//! tests substitute them at the trait seams and assert on the artifacts
//! the pipeline leaves behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use visionqa::config::AuditConfig;
use visionqa::pipeline::{run_audit, CritiqueVideo, RecordSession};

const FIXTURE: &str = r#"{"description":"Test site","ux_score":7,"issues":[{"timestamp":"00:02","severity":"Medium","issue":"Low contrast","details":"Body text is light gray"}]}"#;

struct StubRecorder {
    video: Option<PathBuf>,
}

#[async_trait]
impl RecordSession for StubRecorder {
    async fn record(&self, _url: &str) -> anyhow::Result<Option<PathBuf>> {
        Ok(self.video.clone())
    }
}

struct StubAnalyst {
    response: String,
    called: AtomicBool,
}

impl StubAnalyst {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            called: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CritiqueVideo for StubAnalyst {
    async fn analyze(&self, _video: &Path) -> anyhow::Result<String> {
        self.called.store(true, Ordering::Relaxed);
        Ok(self.response.clone())
    }
}

fn dummy_video(dir: &Path) -> PathBuf {
    let path = dir.join("example.com_20260101_000000.mp4");
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

#[tokio::test]
async fn end_to_end_with_stub_stages() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuditConfig::with_defaults(dir.path(), "test-key");
    let recorder = StubRecorder {
        video: Some(dummy_video(dir.path())),
    };
    let analyst = StubAnalyst::new(FIXTURE);

    let outcome = run_audit(&config, &recorder, &analyst, "https://example.com")
        .await
        .unwrap()
        .expect("pipeline should produce an outcome");

    let html = std::fs::read_to_string(&outcome.report_path).unwrap();
    assert!(html.contains(">7<"), "score missing from report");
    assert!(html.contains("B GRADE"), "grade missing from report");
    assert!(html.contains("MEDIUM"), "issue severity badge missing");
    assert!(html.contains("Low contrast"));
    assert!(html.contains("example.com_20260101_000000.mp4"));

    assert_eq!(outcome.record.ux_score, 7);
    assert_eq!(outcome.record.issues.len(), 1);

    let json = std::fs::read_to_string(&outcome.json_path).unwrap();
    assert!(json.contains("Low contrast"));
    assert!(outcome
        .json_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_qa_report.json"));
}

#[tokio::test]
async fn absent_recording_halts_before_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuditConfig::with_defaults(dir.path(), "test-key");
    let recorder = StubRecorder { video: None };
    let analyst = StubAnalyst::new(FIXTURE);

    let outcome = run_audit(&config, &recorder, &analyst, "https://example.com")
        .await
        .unwrap();

    assert!(outcome.is_none(), "absent artifact must yield no outcome");
    assert!(
        !analyst.called.load(Ordering::Relaxed),
        "inference stage must not run without a video"
    );
}

#[tokio::test]
async fn fenced_response_still_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuditConfig::with_defaults(dir.path(), "test-key");
    let recorder = StubRecorder {
        video: Some(dummy_video(dir.path())),
    };
    let analyst = StubAnalyst::new(&format!("```json\n{FIXTURE}\n```"));

    let outcome = run_audit(&config, &recorder, &analyst, "https://example.com")
        .await
        .unwrap()
        .expect("fenced JSON should decode");
    assert_eq!(outcome.record.ux_score, 7);
}

#[tokio::test]
async fn undecodable_response_terminates_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuditConfig::with_defaults(dir.path(), "test-key");
    let recorder = StubRecorder {
        video: Some(dummy_video(dir.path())),
    };
    let analyst = StubAnalyst::new("the site looked nice, 8/10 would visit again");

    let result = run_audit(&config, &recorder, &analyst, "https://example.com").await;
    assert!(result.is_err(), "non-JSON critique must be a hard error");
}
