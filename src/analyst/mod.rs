//! Vision critique client.
//!
//! Uploads the recorded video to the Gemini file store, waits for it to
//! become usable, then requests a structured UX critique with ordered
//! fallback across model identifiers. Returns the raw structured text;
//! decoding lives in [`crate::report`].

pub mod client;
pub mod model;
pub mod prompt;

pub use client::{GeminiClient, Sleeper, TokioSleeper};
pub use model::{AttemptError, FailureCause, RemoteFile};
