//! Session recorder.
//!
//! Drives headless Chromium through a fixed interaction script while
//! capturing video: navigate, dismiss interstitials, simulate pointer
//! presence, scroll to the bottom over a fixed wall-clock duration. Any
//! session failure is logged and surfaced as an absent artifact, never an
//! error — the pipeline decides what that means.

mod capture;
pub mod session;
mod stealth;

pub use session::{finalize_artifact, video_file_name, DismissOutcome, SessionRecorder};
