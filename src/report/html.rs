//! Static HTML report generation.
//!
//! One self-contained document per run: score, grade, executive summary,
//! the recorded video embedded by relative file name, and one block per
//! issue. Styling comes from CDN-hosted Tailwind and Google Fonts, so the
//! report needs network access to render fully.

use anyhow::Context;
use chrono::Local;
use std::path::PathBuf;
use tracing::info;

use crate::report::model::{EvaluationRecord, Issue, Severity};

pub struct HtmlReporter {
    output_dir: PathBuf,
}

impl HtmlReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Render the report and write it to the output directory.
    ///
    /// The file name is timestamp-derived (`report_YYYYmmdd_HHMMSS.html`)
    /// with no collision detection; two runs inside the same second
    /// overwrite each other. `video_filename` is embedded as a relative
    /// reference — the video is assumed to sit next to the report.
    pub fn generate_report(
        &self,
        record: &EvaluationRecord,
        video_filename: &str,
    ) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create output dir {}", self.output_dir.display())
        })?;

        let html = render_document(record, video_filename);

        let report_name = format!("report_{}.html", Local::now().format("%Y%m%d_%H%M%S"));
        let report_path = self.output_dir.join(report_name);
        std::fs::write(&report_path, html)
            .with_context(|| format!("failed to write report {}", report_path.display()))?;

        info!(path = %report_path.display(), "report generated");
        Ok(report_path)
    }
}

fn render_document(record: &EvaluationRecord, video_filename: &str) -> String {
    let mut sorted = record.clone();
    sorted.sort_issues_by_severity();

    let grade = sorted.grade();
    let (grade_text_color, grade_badge_classes) = grade_colors(sorted.ux_score);
    let timestamp = Local::now().format("%Y-%m-%d %H:%M");

    let issue_blocks: String = sorted.issues.iter().map(render_issue).collect();
    let empty_state = if sorted.issues.is_empty() {
        r#"<div class="p-8 text-center text-gray-500 italic">✨ Clean Bill of Health! No significant issues found.</div>"#
    } else {
        ""
    };

    let description = if sorted.description.is_empty() {
        "No summary provided.".to_string()
    } else {
        escape(&sorted.description)
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>VisionQA Audit Report</title>
    <script src="https://cdn.tailwindcss.com"></script>
    <link href="https://fonts.googleapis.com/css2?family=Inter:wght@300;400;600;700&display=swap" rel="stylesheet">
    <style>
        body {{ font-family: 'Inter', sans-serif; background-color: #F3F4F6; }}
        .glass {{ background: rgba(255, 255, 255, 0.95); backdrop-filter: blur(10px); }}
    </style>
</head>
<body class="p-8">
    <div class="max-w-4xl mx-auto space-y-6">

        <div class="glass rounded-2xl p-8 shadow-sm border border-gray-200 flex justify-between items-center">
            <div>
                <h1 class="text-3xl font-bold text-gray-900 tracking-tight">VisionQA <span class="text-indigo-600">Audit</span></h1>
                <p class="text-gray-500 mt-2">Generated on {timestamp}</p>
            </div>
            <div class="text-right">
                <div class="text-sm font-semibold text-gray-400 uppercase tracking-wider">UX Score</div>
                <div class="text-6xl font-black {grade_text_color}">{score}<span class="text-3xl text-gray-300">/10</span></div>
                <div class="inline-block px-3 py-1 rounded-full text-xs font-bold mt-2 {grade_badge_classes}">{grade} GRADE</div>
            </div>
        </div>

        <div class="glass rounded-2xl p-8 shadow-sm border border-gray-200">
            <h2 class="text-lg font-bold text-gray-900 mb-4">Verification Artifact (Video)</h2>
            <div class="aspect-w-16 aspect-h-9 bg-gray-900 rounded-lg overflow-hidden">
                <video controls class="w-full h-full object-contain">
                    <source src="{video}" type="video/mp4">
                    Your browser does not support the video tag.
                </video>
            </div>
        </div>

        <div class="glass rounded-2xl p-8 shadow-sm border border-gray-200">
            <h2 class="text-lg font-bold text-gray-900 mb-2">Executive Summary</h2>
            <p class="text-gray-700 leading-relaxed text-lg">{description}</p>
        </div>

        <div class="space-y-4">
            <h2 class="text-xl font-bold text-gray-900 ml-1">Detected Issues ({issue_count})</h2>
            {issue_blocks}
            {empty_state}
        </div>

    </div>
</body>
</html>
"#,
        timestamp = timestamp,
        grade_text_color = grade_text_color,
        score = sorted.ux_score,
        grade_badge_classes = grade_badge_classes,
        grade = grade,
        video = escape(video_filename),
        description = description,
        issue_count = sorted.issues.len(),
        issue_blocks = issue_blocks,
        empty_state = empty_state,
    )
}

fn render_issue(issue: &Issue) -> String {
    let border = match issue.severity {
        Severity::High => "border-l-4 border-red-500 bg-white",
        Severity::Medium => "border-l-4 border-yellow-500 bg-white",
        _ => "border-l-4 border-blue-500 bg-white",
    };
    let badge = match issue.severity {
        Severity::High => "bg-red-100 text-red-800",
        Severity::Medium => "bg-yellow-100 text-yellow-800",
        _ => "bg-blue-100 text-blue-800",
    };

    format!(
        r#"
        <div class="p-6 rounded-lg shadow-sm {border} transition hover:shadow-md">
            <div class="flex justify-between items-start">
                <div class="flex items-center space-x-3">
                    <span class="px-2.5 py-0.5 rounded-full text-xs font-medium {badge}">{severity}</span>
                    <span class="text-sm text-gray-400 font-mono">{timestamp}</span>
                </div>
            </div>
            <h3 class="mt-2 text-lg font-bold text-gray-900">{title}</h3>
            <p class="mt-1 text-gray-600">{details}</p>
        </div>
"#,
        border = border,
        badge = badge,
        severity = issue.severity.as_str().to_uppercase(),
        timestamp = escape(&issue.timestamp),
        title = escape(&issue.issue),
        details = escape(&issue.details),
    )
}

/// Text color + badge classes for the score header, matching the grade
/// thresholds in [`crate::report::model::Grade`].
fn grade_colors(score: i64) -> (&'static str, &'static str) {
    if score >= 9 {
        ("text-green-600", "text-green-600 bg-green-50")
    } else if score >= 8 {
        ("text-green-500", "text-green-500 bg-green-50")
    } else if score >= 6 {
        ("text-blue-500", "text-blue-500 bg-blue-50")
    } else if score >= 4 {
        ("text-yellow-600", "text-yellow-600 bg-yellow-50")
    } else {
        ("text-red-600", "text-red-600 bg-red-50")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::parse_evaluation;

    const FIXTURE: &str = r#"{"description":"Test site","ux_score":7,
        "issues":[{"timestamp":"00:02","severity":"Medium",
                   "issue":"Low contrast","details":"Body text is light gray"}]}"#;

    #[test]
    fn document_contains_score_grade_and_issue() {
        let record = parse_evaluation(FIXTURE).unwrap();
        let html = render_document(&record, "site_20260101_000000.mp4");
        assert!(html.contains(">7<"));
        assert!(html.contains("B GRADE"));
        assert!(html.contains("MEDIUM"));
        assert!(html.contains("Low contrast"));
        assert!(html.contains("site_20260101_000000.mp4"));
    }

    #[test]
    fn empty_issue_list_renders_clean_bill() {
        let record = parse_evaluation(r#"{"description":"Ok","ux_score":9,"issues":[]}"#).unwrap();
        let html = render_document(&record, "v.mp4");
        assert!(html.contains("Clean Bill of Health"));
        assert!(html.contains("A+ GRADE"));
    }

    #[test]
    fn issues_render_in_severity_order() {
        let record = parse_evaluation(
            r#"{"description":"x","ux_score":4,"issues":[
                {"timestamp":"00:01","severity":"Low","issue":"zeta","details":""},
                {"timestamp":"00:02","severity":"High","issue":"alpha","details":""}]}"#,
        )
        .unwrap();
        let html = render_document(&record, "v.mp4");
        let high_pos = html.find("alpha").unwrap();
        let low_pos = html.find("zeta").unwrap();
        assert!(high_pos < low_pos);
    }

    #[test]
    fn writes_report_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = HtmlReporter::new(dir.path());
        let record = parse_evaluation(FIXTURE).unwrap();
        let path = reporter.generate_report(&record, "video.mp4").unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("report_") && name.ends_with(".html"));
    }

    #[test]
    fn escapes_markup_in_model_text() {
        let record = parse_evaluation(
            r#"{"description":"<script>alert(1)</script>","ux_score":5,"issues":[]}"#,
        )
        .unwrap();
        let html = render_document(&record, "v.mp4");
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
