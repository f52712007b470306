//! Gemini REST client: upload + poll, critique request, model fallback.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analyst::model::{
    AttemptError, Content, FailureCause, FileState, FileUploadResponse, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, Part, RemoteFile,
};
use crate::analyst::prompt::AUDIT_RUBRIC;
use crate::config::AnalystConfig;

/// Injectable delay dependency so backoff behavior is testable without
/// real waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Client for the hosted vision model.
pub struct GeminiClient<S: Sleeper = TokioSleeper> {
    http: reqwest::Client,
    base_url: String,
    config: AnalystConfig,
    sleeper: S,
}

impl GeminiClient<TokioSleeper> {
    pub fn new(config: &AnalystConfig, api_key: &str) -> Result<Self> {
        Self::with_sleeper(config, api_key, TokioSleeper)
    }
}

impl<S: Sleeper> GeminiClient<S> {
    pub fn with_sleeper(config: &AnalystConfig, api_key: &str, sleeper: S) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing inference API key");

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid inference API key")?,
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build inference HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            sleeper,
        })
    }

    /// Upload the video to the remote file store and wait until it is usable.
    ///
    /// Polls the processing state at the configured interval; a terminal
    /// `FAILED` state is unrecoverable. After the file reports ready, the
    /// configured propagation delay is imposed before the reference is
    /// handed out — the readiness flag alone is not trustworthy across the
    /// service's regions.
    pub async fn upload_video(&self, path: &Path) -> Result<RemoteFile> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "session.mp4".to_string());
        let mime = if file_name.ends_with(".webm") {
            "video/webm"
        } else {
            "video/mp4"
        };

        info!(file = %file_name, "uploading video");
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read video {}", path.display()))?;

        let metadata = serde_json::json!({ "file": { "display_name": file_name } });
        let form = multipart::Form::new()
            .part(
                "metadata",
                multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .context("invalid metadata part")?,
            )
            .part(
                "file",
                multipart::Part::bytes(bytes)
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .context("invalid video part")?,
            );

        let url = format!("{}/upload/v1beta/files", self.base_url);
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("video upload request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("video upload rejected ({status}): {body}");
        }
        let mut file = resp
            .json::<FileUploadResponse>()
            .await
            .context("failed to parse upload response")?
            .file;

        while file.state == FileState::Processing {
            debug!(name = %file.name, "remote store still processing");
            self.sleeper
                .sleep(Duration::from_millis(self.config.upload_poll_interval_ms))
                .await;
            file = self.fetch_file_status(&file.name).await?;
        }

        if file.state == FileState::Failed {
            bail!("remote store marked {} as failed", file.name);
        }

        info!(name = %file.name, "video active — letting file propagate");
        self.sleeper
            .sleep(Duration::from_secs(self.config.propagation_delay_secs))
            .await;

        Ok(file)
    }

    async fn fetch_file_status(&self, name: &str) -> Result<RemoteFile> {
        let url = format!("{}/v1beta/{}", self.base_url, name);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("file status request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("file status check failed ({status}): {body}");
        }
        resp.json::<RemoteFile>()
            .await
            .context("failed to parse file status response")
    }

    /// Request the critique, walking the model chain in order.
    ///
    /// Returns the raw text of the first successful response. Decoding is
    /// the caller's job (see [`crate::report::parse_evaluation`]).
    pub async fn critique(&self, file: &RemoteFile) -> Result<String> {
        run_fallback(
            &self.config.model_chain,
            &self.config,
            &self.sleeper,
            |model| self.attempt_generate(model, file),
        )
        .await
    }

    /// One attempt against one model identifier. Never retried.
    async fn attempt_generate(
        &self,
        model: String,
        file: &RemoteFile,
    ) -> std::result::Result<String, AttemptError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::from_file(file), Part::from_text(AUDIT_RUBRIC)],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::classify(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::classify(format!("{status}: {body}")));
        }

        let parsed = resp
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AttemptError::classify(e.to_string()))?;
        parsed.into_text().ok_or_else(|| AttemptError {
            cause: FailureCause::Other,
            message: "response contained no text parts".to_string(),
        })
    }
}

/// Ordered fallback: each identifier gets exactly one attempt. Rate-limit
/// and overload failures sleep their fixed backoff before the next
/// identifier; any failure class advances the chain; exhausting it raises
/// an error carrying the final underlying message.
pub(crate) async fn run_fallback<S, F, Fut>(
    models: &[String],
    config: &AnalystConfig,
    sleeper: &S,
    mut attempt: F,
) -> Result<String>
where
    S: Sleeper,
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<String, AttemptError>>,
{
    if models.is_empty() {
        bail!("no model identifiers configured");
    }
    let last = models.len() - 1;

    for (i, model) in models.iter().enumerate() {
        info!(model = %model, "attempting critique");
        match attempt(model.clone()).await {
            Ok(text) => {
                info!(model = %model, "critique succeeded");
                return Ok(text);
            }
            Err(err) => {
                warn!(model = %model, cause = ?err.cause, err = %err.message, "model attempt failed");
                if i == last {
                    bail!("all models failed; last error: {}", err.message);
                }
                match err.cause {
                    FailureCause::RateLimited => {
                        debug!(
                            secs = config.rate_limit_backoff_secs,
                            "quota limit hit — backing off"
                        );
                        sleeper
                            .sleep(Duration::from_secs(config.rate_limit_backoff_secs))
                            .await;
                    }
                    FailureCause::Overloaded => {
                        debug!(
                            secs = config.overload_backoff_secs,
                            "server overloaded — backing off"
                        );
                        sleeper
                            .sleep(Duration::from_secs(config.overload_backoff_secs))
                            .await;
                    }
                    FailureCause::Other => {}
                }
                debug!("switching to next model");
            }
        }
    }

    unreachable!("fallback loop returns or bails on the last model")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records requested delays instead of sleeping.
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Self {
            Self {
                slept: Mutex::new(Vec::new()),
            }
        }

        fn delays(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn models(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("model-{i}")).collect()
    }

    #[tokio::test]
    async fn exhausting_the_chain_attempts_each_model_once() {
        let config = AnalystConfig::default();
        let sleeper = RecordingSleeper::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = run_fallback(&models(3), &config, &sleeper, |model| {
            let c = calls2.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err(AttemptError::classify(format!("400 bad request to {model}")))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::Relaxed), 3);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("model-3"), "error should carry the last message: {err}");
        // Non-transient failures advance without sleeping.
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn classified_failures_use_their_backoff() {
        let config = AnalystConfig::default();
        let sleeper = RecordingSleeper::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = run_fallback(&models(3), &config, &sleeper, |_model| {
            let c = calls2.clone();
            async move {
                let n = c.fetch_add(1, Ordering::Relaxed);
                match n {
                    0 => Err(AttemptError::classify("429 RESOURCE_EXHAUSTED")),
                    1 => Err(AttemptError::classify("503 overloaded")),
                    _ => Err(AttemptError::classify("400 nope")),
                }
            }
        })
        .await;

        assert!(result.is_err());
        // 30 s for the rate limit, 5 s for the overload, nothing after the
        // last identifier.
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(30), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let config = AnalystConfig::default();
        let sleeper = RecordingSleeper::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = run_fallback(&models(3), &config, &sleeper, |model| {
            let c = calls2.clone();
            async move {
                let n = c.fetch_add(1, Ordering::Relaxed);
                if n == 0 {
                    Err(AttemptError::classify("429 quota"))
                } else {
                    Ok(format!("critique from {model}"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "critique from model-2");
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let config = AnalystConfig::default();
        let sleeper = RecordingSleeper::new();
        let result = run_fallback(&[], &config, &sleeper, |_m| async move {
            Ok::<String, AttemptError>("unreachable".to_string())
        })
        .await;
        assert!(result.is_err());
    }
}
