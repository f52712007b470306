//! Terminal rendering of the critique, printed before the HTML artifact
//! is written.

use crate::report::model::EvaluationRecord;

/// Print the score, summary, and severity-sorted issue list to stdout.
pub fn print_summary(record: &EvaluationRecord) {
    let mut sorted = record.clone();
    sorted.sort_issues_by_severity();

    println!("\n{}", "-".repeat(60));
    println!(" UX SCORE: {}/10", sorted.ux_score);
    let summary = if sorted.description.is_empty() {
        "N/A"
    } else {
        &sorted.description
    };
    println!(" SUMMARY: {summary}");
    println!("{}", "-".repeat(60));

    if sorted.issues.is_empty() {
        println!(" No major issues found.");
    } else {
        println!(" DETECTED ISSUES ({}):", sorted.issues.len());
        for (i, issue) in sorted.issues.iter().enumerate() {
            println!(
                "   {}. {} [{}] {}",
                i + 1,
                issue.severity.icon(),
                issue.severity,
                issue.issue
            );
            println!("      ↳ {}", issue.details);
        }
    }
    println!("{}", "-".repeat(60));
}
