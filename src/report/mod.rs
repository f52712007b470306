//! Evaluation record model and report rendering.
//!
//! The critique stage returns raw text; everything downstream of that —
//! fence stripping, schema-validating decode, severity ordering, grade
//! mapping, HTML and console output — lives here.

pub mod console;
pub mod html;
pub mod model;

pub use html::HtmlReporter;
pub use model::{parse_evaluation, EvaluationRecord, Grade, Issue, Severity};
