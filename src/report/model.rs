// SPDX-License-Identifier: MIT
//! Data model for the structured critique returned by the vision model.
//!
//! The model is asked for a fixed JSON shape (`description`, `ux_score`,
//! `issues[]`); decoding is schema-validating via serde with explicit
//! defaults for fields the model occasionally omits.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Ordinal priority tag on an issue.
///
/// Anything the model emits outside High/Medium/Low decodes to `Unknown`,
/// which sorts after everything else. A missing severity field defaults to
/// `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    /// Sort rank: High first, unknown values last.
    pub fn rank(self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
            Severity::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Unknown => "Unknown",
        }
    }

    /// Terminal icon for the console summary.
    pub fn icon(self) -> &'static str {
        match self {
            Severity::High => "🔴",
            Severity::Medium => "🟡",
            _ => "🟢",
        }
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl From<Severity> for String {
    fn from(s: Severity) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Issue ────────────────────────────────────────────────────────────────────

/// A single UX finding. Independent of other issues; the model does not
/// order them, so every consumer sorts by severity before presenting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Free-form "MM:SS" position in the video. Not validated against the
    /// video's actual duration.
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Short title of the finding.
    #[serde(default = "default_issue_title")]
    pub issue: String,
    /// Free-text explanation.
    #[serde(default)]
    pub details: String,
}

fn default_timestamp() -> String {
    "00:00".to_string()
}

fn default_severity() -> Severity {
    Severity::Low
}

fn default_issue_title() -> String {
    "Unknown Issue".to_string()
}

// ─── EvaluationRecord ─────────────────────────────────────────────────────────

/// The parsed critique: summary, score, findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// One-sentence summary of what the site is.
    #[serde(default)]
    pub description: String,
    /// Intended range 1–10; not clamped, the grade thresholds are total
    /// over the integer domain.
    #[serde(default)]
    pub ux_score: i64,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl EvaluationRecord {
    /// Reorder issues in place: High → Medium → Low → Unknown, stable
    /// within each group (model-given order is preserved for ties).
    pub fn sort_issues_by_severity(&mut self) {
        self.issues.sort_by_key(|i| i.severity.rank());
    }

    pub fn grade(&self) -> Grade {
        Grade::from_score(self.ux_score)
    }
}

// ─── Grade ────────────────────────────────────────────────────────────────────

/// Letter grade derived from the UX score.
///
/// Grading rubric:
/// - `A+` — score ≥ 9
/// - `A`  — score ≥ 8
/// - `B`  — score ≥ 6
/// - `C`  — score ≥ 4
/// - `F`  — everything below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    F,
}

impl Grade {
    /// Total over all integers — out-of-range scores degrade through the
    /// same thresholds.
    pub fn from_score(score: i64) -> Self {
        if score >= 9 {
            Grade::APlus
        } else if score >= 8 {
            Grade::A
        } else if score >= 6 {
            Grade::B
        } else if score >= 4 {
            Grade::C
        } else {
            Grade::F
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Decoding ─────────────────────────────────────────────────────────────────

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\s*").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").unwrap());

/// Strip a surrounding markdown code fence (with or without a language tag).
///
/// Responses requested in JSON mode usually arrive bare, but some models
/// wrap anyway. Idempotent: already-unwrapped input passes through.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let opened = FENCE_OPEN.replace(trimmed, "");
    FENCE_CLOSE.replace(&opened, "").to_string()
}

/// Decode the raw critique text into an [`EvaluationRecord`].
///
/// The single place where fence stripping and JSON decoding happen —
/// both the pipeline and any standalone consumer go through here.
pub fn parse_evaluation(raw: &str) -> anyhow::Result<EvaluationRecord> {
    let clean = strip_code_fence(raw);
    serde_json::from_str(&clean).context("critique response is not valid evaluation JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn grade_thresholds() {
        assert_eq!(Grade::from_score(10), Grade::APlus);
        assert_eq!(Grade::from_score(9), Grade::APlus);
        assert_eq!(Grade::from_score(8), Grade::A);
        assert_eq!(Grade::from_score(7), Grade::B);
        assert_eq!(Grade::from_score(6), Grade::B);
        assert_eq!(Grade::from_score(5), Grade::C);
        assert_eq!(Grade::from_score(4), Grade::C);
        assert_eq!(Grade::from_score(3), Grade::F);
        assert_eq!(Grade::from_score(0), Grade::F);
        // Out-of-range scores degrade through the same thresholds.
        assert_eq!(Grade::from_score(42), Grade::APlus);
        assert_eq!(Grade::from_score(-5), Grade::F);
    }

    proptest! {
        #[test]
        fn grade_is_monotone(a in -100i64..100, b in -100i64..100) {
            // A higher score never yields a worse grade.
            fn ord(g: Grade) -> u8 {
                match g {
                    Grade::APlus => 0,
                    Grade::A => 1,
                    Grade::B => 2,
                    Grade::C => 3,
                    Grade::F => 4,
                }
            }
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ord(Grade::from_score(hi)) <= ord(Grade::from_score(lo)));
        }
    }

    fn issue(sev: &str, title: &str) -> Issue {
        Issue {
            timestamp: "00:01".to_string(),
            severity: Severity::from(sev.to_string()),
            issue: title.to_string(),
            details: String::new(),
        }
    }

    #[test]
    fn severity_sort_groups_and_is_stable() {
        let mut record = EvaluationRecord {
            description: String::new(),
            ux_score: 5,
            issues: vec![
                issue("Low", "l1"),
                issue("critical", "u1"),
                issue("High", "h1"),
                issue("Medium", "m1"),
                issue("High", "h2"),
                issue("whatever", "u2"),
                issue("Medium", "m2"),
            ],
        };
        record.sort_issues_by_severity();
        let titles: Vec<&str> = record.issues.iter().map(|i| i.issue.as_str()).collect();
        assert_eq!(titles, vec!["h1", "h2", "m1", "m2", "l1", "u1", "u2"]);
    }

    #[test]
    fn fence_stripping_with_language_tag() {
        let bare = r#"{"ux_score": 7}"#;
        let fenced = format!("```json\n{bare}\n```");
        assert_eq!(strip_code_fence(&fenced), bare);
    }

    #[test]
    fn fence_stripping_without_language_tag() {
        let bare = r#"{"ux_score": 7}"#;
        let fenced = format!("```\n{bare}\n```");
        assert_eq!(strip_code_fence(&fenced), bare);
    }

    #[test]
    fn fence_stripping_is_idempotent() {
        let bare = r#"{"ux_score": 7}"#;
        assert_eq!(strip_code_fence(bare), bare);
        let once = strip_code_fence(&format!("```json\n{bare}\n```"));
        assert_eq!(strip_code_fence(&once), once);
    }

    #[test]
    fn parse_applies_field_defaults() {
        let record = parse_evaluation(
            r#"{"description": "A shop", "ux_score": 3,
                "issues": [{"issue": "Tiny text"}]}"#,
        )
        .unwrap();
        assert_eq!(record.ux_score, 3);
        assert_eq!(record.issues.len(), 1);
        // Missing severity defaults to lowest priority, not Unknown.
        assert_eq!(record.issues[0].severity, Severity::Low);
        assert_eq!(record.issues[0].timestamp, "00:00");
        assert_eq!(record.issues[0].details, "");
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse_evaluation("the site looks fine to me").is_err());
    }

    #[test]
    fn unknown_severity_values_rank_last() {
        let sev = Severity::from("Catastrophic".to_string());
        assert_eq!(sev, Severity::Unknown);
        assert!(sev.rank() > Severity::Low.rank());
    }
}
