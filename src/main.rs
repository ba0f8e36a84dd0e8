use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use form_autofill::generate::UnavailableGenerator;
use form_autofill::{
    AutofillBrowser, AutofillConfig, AutofillSession, CancelFlag, ChatCompletionsGenerator,
    Generator, ProfileRecord,
};

#[derive(Parser)]
#[command(name = "form-autofill")]
#[command(about = "Fill web forms from a candidate profile", long_about = None)]
#[command(version)]
struct Cli {
    /// Page to open
    url: String,

    /// Profile file (.json or .toml)
    #[arg(short, long, env = "FORM_AUTOFILL_PROFILE")]
    profile: PathBuf,

    /// Run configuration (TOML); built-in defaults when omitted
    #[arg(short, long, env = "FORM_AUTOFILL_CONFIG")]
    config: Option<PathBuf>,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,

    /// Leave Chrome's automation markers visible
    #[arg(long)]
    no_stealth: bool,

    /// Chrome executable to launch instead of the detected one
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => AutofillConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AutofillConfig::default(),
    };
    let profile = ProfileRecord::from_path(&cli.profile)
        .with_context(|| format!("loading profile {}", cli.profile.display()))?;
    info!(fields = profile.len(), "profile loaded");

    let generation = &config.generation;
    let generator: Arc<dyn Generator> = match ChatCompletionsGenerator::from_env(
        &generation.base_url,
        generation.model.clone(),
        &generation.api_key_env,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "open questions will be skipped");
            Arc::new(UnavailableGenerator::new(generation.api_key_env.clone()))
        }
    };

    let mut builder = AutofillBrowser::builder()
        .headless(cli.headless)
        .stealth(!cli.no_stealth);
    if let Some(path) = &cli.chrome_path {
        builder = builder.chrome_path(path.clone());
    }
    let browser = builder.build().await.context("launching Chrome")?;
    let page = browser.new_page(&cli.url).await.context("opening page")?;
    info!(title = %page.title().await.unwrap_or_default(), "page ready; use the panel to select a form area");

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current field");
                cancel.cancel();
            }
        });
    }

    let session = AutofillSession::new(&config, profile, generator);
    let reports = session.run(&page, &cancel).await?;

    for (i, report) in reports.iter().enumerate() {
        println!("Run {}: {}", i + 1, report.summary());
        for label in &report.skipped_labels {
            println!("  skipped: {label}");
        }
        for label in &report.mismatched_labels {
            println!("  mismatched: {label}");
        }
    }
    Ok(())
}
