use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use visionqa::analyst::GeminiClient;
use visionqa::config::AuditConfig;
use visionqa::pipeline;
use visionqa::recorder::SessionRecorder;
use visionqa::report::console;

#[derive(Parser)]
#[command(
    name = "visionqa",
    about = "VisionQA — AI-powered UX auditor",
    version
)]
struct Args {
    /// The website URL to audit
    url: String,

    /// Output directory for the video, JSON, and report artifacts
    #[arg(long, env = "VISIONQA_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VISIONQA_LOG")]
    log: Option<String>,

    /// Suppress the banner and console summary.
    ///
    /// Errors are still printed to stderr.
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Do not open the finished report in the default viewer
    #[arg(long)]
    no_open: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AuditConfig::resolve(args.output_dir.clone(), args.log.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.log);

    if !args.quiet {
        print_banner();
    }

    tokio::select! {
        result = run(&args, &config) => {
            if let Err(e) = result {
                eprintln!("\n Error during audit: {e:?}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n\n Audit interrupted by user.");
            std::process::exit(130);
        }
    }
}

async fn run(args: &Args, config: &AuditConfig) -> Result<()> {
    let recorder = SessionRecorder::new(
        &config.output_dir,
        config.scratch_dir(),
        config.recorder.clone(),
    );
    let analyst = GeminiClient::new(&config.analyst, &config.api_key)?;

    let outcome = match pipeline::run_audit(config, &recorder, &analyst, &args.url).await? {
        Some(outcome) => outcome,
        None => {
            eprintln!(" Fatal Error: Browser failed to record video.");
            std::process::exit(1);
        }
    };

    if !args.quiet {
        console::print_summary(&outcome.record);
        println!("\n SUCCESS: Report Generated!");
        println!(
            " Open this file: {}",
            outcome
                .report_path
                .canonicalize()
                .unwrap_or_else(|_| outcome.report_path.clone())
                .display()
        );
    }

    if !args.no_open {
        open_in_viewer(&outcome.report_path);
    }
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_banner() {
    println!("\n{}", "=".repeat(60));
    println!("     VisionQA: AI-Powered UX Auditor");
    println!("{}\n", "=".repeat(60));
}

/// Best-effort: hand the report to the platform's default viewer.
fn open_in_viewer(path: &Path) {
    #[cfg(target_os = "macos")]
    let mut cmd = {
        let mut c = std::process::Command::new("open");
        c.arg(path);
        c
    };
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut cmd = {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(path);
        c
    };

    if let Err(e) = cmd
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        debug!(err = %e, "could not open report in default viewer");
    }
}
