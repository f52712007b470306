//! Wire types for the Gemini REST API and the classified per-attempt error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── File store ───────────────────────────────────────────────────────────────

/// Processing state of an uploaded file on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    #[serde(other)]
    Unknown,
}

/// An uploaded file as reported by the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    /// Download/reference URI passed back in generateContent requests.
    pub uri: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default = "default_state")]
    pub state: FileState,
}

fn default_mime_type() -> String {
    "video/mp4".to_string()
}

fn default_state() -> FileState {
    FileState::Processing
}

/// The upload endpoint wraps the file object; the status endpoint does not.
#[derive(Debug, Deserialize)]
pub struct FileUploadResponse {
    pub file: RemoteFile,
}

// ─── generateContent ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

/// One part of a request: either an uploaded-file reference or prompt text.
#[derive(Debug, Serialize)]
pub struct Part {
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn from_file(file: &RemoteFile) -> Self {
        Self {
            file_data: Some(FileData {
                file_uri: file.uri.clone(),
                mime_type: file.mime_type.clone(),
            }),
            text: None,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            file_data: None,
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_uri: String,
    pub mime_type: String,
}

/// Low temperature plus a JSON response MIME type keep the model on the
/// requested schema.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub response_mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: CandidateContent,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// First text part of the first candidate, if any.
    pub fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content
            .parts
            .into_iter()
            .find_map(|p| p.text)
    }
}

// ─── Per-attempt error ────────────────────────────────────────────────────────

/// Why a single model attempt failed, derived from the error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Quota exhausted (HTTP 429 / RESOURCE_EXHAUSTED).
    RateLimited,
    /// Service overloaded (HTTP 503 / "overloaded").
    Overloaded,
    /// Anything else — bad request, network failure, empty response.
    Other,
}

/// Failure of one model attempt, carrying the classified cause so the
/// fallback loop can pick the matching backoff.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AttemptError {
    pub cause: FailureCause,
    pub message: String,
}

impl AttemptError {
    /// Classify by substring match against the raw error text, the same
    /// signals the hosted service embeds in its error bodies.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let cause = if message.contains("429") || message.contains("RESOURCE_EXHAUSTED") {
            FailureCause::RateLimited
        } else if message.contains("503") || message.contains("overloaded") {
            FailureCause::Overloaded
        } else {
            FailureCause::Other
        };
        Self { cause, message }
    }
}
