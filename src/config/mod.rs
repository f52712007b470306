use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const SCRATCH_DIR_NAME: &str = "temp_video";

/// Desktop Chrome user-agent presented to audited pages.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

// ─── RecorderConfig ───────────────────────────────────────────────────────────

/// Session recorder tuning (`[recorder]` in config.toml).
///
/// All timing here is open-loop: the scroll pass divides
/// `scroll_duration_secs` into `scroll_steps` equal hops regardless of what
/// the page renders in between.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Viewport width in pixels. Default: 1920.
    pub viewport_width: u32,
    /// Viewport height in pixels. Default: 1080.
    pub viewport_height: u32,
    /// User-agent string presented to the page.
    pub user_agent: String,
    /// Browser locale override. Default: "en-US".
    pub locale: String,
    /// Browser timezone override. Default: "America/New_York".
    pub timezone: String,
    /// Navigation timeout in seconds (DOMContentLoaded, not full load).
    /// Expiry fails the whole recording — no retry. Default: 45.
    pub nav_timeout_secs: u64,
    /// Pause after navigation before interacting, in milliseconds. Default: 3000.
    pub settle_ms: u64,
    /// Wall-clock duration of the scripted scroll, in seconds. Default: 20.
    pub scroll_duration_secs: u64,
    /// Number of equal scroll hops the duration is divided into. Default: 40.
    pub scroll_steps: u32,
    /// Pause after the scroll completes, in milliseconds. Default: 2000.
    pub tail_ms: u64,
    /// A randomized pointer burst is issued every Nth scroll step. Default: 5.
    pub pointer_burst_every: u32,
    /// Capture and playback frame rate of the session video. Default: 10.
    pub frame_rate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            nav_timeout_secs: 45,
            settle_ms: 3000,
            scroll_duration_secs: 20,
            scroll_steps: 40,
            tail_ms: 2000,
            pointer_burst_every: 5,
            frame_rate: 10,
        }
    }
}

// ─── AnalystConfig ────────────────────────────────────────────────────────────

/// Vision critique client tuning (`[analyst]` in config.toml).
///
/// The propagation delay and both backoffs are empirically tuned against
/// the hosted service's latency profile; a different deployment (or a
/// test) can shorten them here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalystConfig {
    /// Base URL of the inference service.
    pub api_base_url: String,
    /// Ordered model identifiers. Each gets exactly one attempt.
    pub model_chain: Vec<String>,
    /// Whole-request HTTP timeout in seconds. Generous so long video
    /// analyses are not cut off client-side. Default: 600.
    pub http_timeout_secs: u64,
    /// Interval between upload status polls, in milliseconds. Default: 2000.
    pub upload_poll_interval_ms: u64,
    /// Wait after the uploaded file reports ready, in seconds, to absorb
    /// propagation across the service's regions. Default: 10.
    pub propagation_delay_secs: u64,
    /// Sleep before the next model after a rate-limit failure, in seconds.
    /// Default: 30.
    pub rate_limit_backoff_secs: u64,
    /// Sleep before the next model after a server-overload failure, in
    /// seconds. Default: 5.
    pub overload_backoff_secs: u64,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model_chain: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-3-flash-preview".to_string(),
            ],
            http_timeout_secs: 600,
            upload_poll_interval_ms: 2000,
            propagation_delay_secs: 10,
            rate_limit_backoff_secs: 30,
            overload_backoff_secs: 5,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{output_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Output directory for video, JSON, and report artifacts.
    output_dir: Option<PathBuf>,
    /// Log level filter string, e.g. "debug", "info,visionqa=trace".
    log: Option<String>,
    /// Inference-service API key. Env var GEMINI_API_KEY takes precedence.
    api_key: Option<String>,
    /// Session recorder tuning (`[recorder]`).
    recorder: Option<RecorderConfig>,
    /// Vision critique client tuning (`[analyst]`).
    analyst: Option<AnalystConfig>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── AuditConfig ──────────────────────────────────────────────────────────────

/// Resolved configuration for one audit run, passed into each component at
/// construction.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Directory receiving the video, JSON, and report artifacts.
    pub output_dir: PathBuf,
    /// Log filter string for tracing-subscriber.
    pub log: String,
    /// Inference-service API key. Absence is a fatal startup error.
    pub api_key: String,
    pub recorder: RecorderConfig,
    pub analyst: AnalystConfig,
}

impl AuditConfig {
    /// Resolve the effective configuration.
    ///
    /// `cli_output_dir` and `cli_log` come from clap (flags or their env
    /// equivalents) and win over `config.toml`, which wins over defaults.
    /// The API key is taken from `GEMINI_API_KEY`, falling back to the TOML
    /// `api_key` field; if neither is set this returns an error before any
    /// stage runs.
    pub fn resolve(
        cli_output_dir: Option<PathBuf>,
        cli_log: Option<String>,
    ) -> anyhow::Result<Self> {
        let toml_path = cli_output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
            .join("config.toml");
        let file = load_toml(&toml_path).unwrap_or_default();

        let output_dir = cli_output_dir
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let log = cli_log
            .or(file.log)
            .unwrap_or_else(|| "info".to_string());

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or(file.api_key)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "GEMINI_API_KEY is not set (environment variable or `api_key` in config.toml)"
                )
            })?;

        Ok(Self {
            output_dir,
            log,
            api_key,
            recorder: file.recorder.unwrap_or_default(),
            analyst: file.analyst.unwrap_or_default(),
        })
    }

    /// Build a config with defaults and an explicit key — used by tests and
    /// embedders that manage their own secrets.
    pub fn with_defaults(output_dir: impl Into<PathBuf>, api_key: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            log: "info".to_string(),
            api_key: api_key.into(),
            recorder: RecorderConfig::default(),
            analyst: AnalystConfig::default(),
        }
    }

    /// Disposable scratch subdirectory used only during recording.
    pub fn scratch_dir(&self) -> PathBuf {
        self.output_dir.join(SCRATCH_DIR_NAME)
    }
}
