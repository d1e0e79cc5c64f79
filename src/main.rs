mod classifier;
mod cli;
mod config;
mod dispatcher;
mod download;
mod error;
mod gate;
mod messaging;
mod pipeline;
mod state_machine;
mod transcode;
mod ui;
mod workspace;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::BotConfig;
use dispatcher::{DispatchSummary, Dispatcher};
use download::Downloader;
use error::BotError;
use gate::ConcurrencyGate;
use messaging::DiscordClient;
use pipeline::JobPipeline;
use transcode::{FfmpegInvoker, Transcoder};
use ui::RenderProgress;
use workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = BotConfig::load().context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    match cli.command {
        Command::Serve => {
            let summary = serve(config).await.context("serve failed")?;
            info!(
                jobs = summary.total(),
                completed = summary.completed,
                failed = summary.failed,
                crashed = summary.crashed,
                "Shut down"
            );
        }
        Command::Render { input, output } => render(&config, &input, &output).await?,
        Command::Check => check(&config).await?,
    }

    Ok(())
}

/// Logs go to stderr so `serve` keeps stdin/stdout free for events.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("overlay_bot=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_pipeline(config: &BotConfig) -> Result<JobPipeline, BotError> {
    let messenger = DiscordClient::with_base_url(
        config.discord_token.clone(),
        config.discord_api_base.clone(),
    )?;
    let downloader = Downloader::new(config.download_timeout())?;
    let transcoder = FfmpegInvoker::new(config.ffmpeg_path.clone(), config.transcode_timeout());

    Ok(JobPipeline::new(
        WorkspaceManager::new(config.scratch_root()),
        downloader,
        Arc::new(transcoder),
        Arc::new(messenger),
        config.background_path.clone(),
    ))
}

async fn serve(config: BotConfig) -> Result<DispatchSummary, BotError> {
    config.validate(true)?;

    let pipeline = Arc::new(build_pipeline(&config)?);
    let gate = ConcurrencyGate::new(config.max_concurrent);
    info!(
        max_concurrent = gate.capacity(),
        scratch = %config.scratch_root().display(),
        "Waiting for message events on stdin"
    );
    let dispatcher = Dispatcher::start(pipeline, gate);

    // Whatever ends intake, queued and running jobs are drained below.
    tokio::select! {
        queued = dispatcher.consume(BufReader::new(tokio::io::stdin())) => {
            info!(queued, "Input closed; finishing in-flight jobs");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; finishing in-flight jobs");
        }
    }

    Ok(dispatcher.shutdown().await)
}

async fn render(config: &BotConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    config.validate(false)?;
    if !input.is_file() {
        bail!("input file not found: {}", input.display());
    }

    let invoker = FfmpegInvoker::new(config.ffmpeg_path.clone(), config.transcode_timeout());
    let progress = RenderProgress::start(input);
    let result = invoker
        .invoke(&config.background_path, input, output)
        .await;
    progress.complete(&result);

    result.with_context(|| format!("failed to render {}", input.display()))?;
    Ok(())
}

async fn check(config: &BotConfig) -> anyhow::Result<()> {
    let invoker = FfmpegInvoker::new(config.ffmpeg_path.clone(), config.transcode_timeout());
    let version = invoker.version().await;
    ui::print_check(config, &version);

    config.validate(false)?;
    version.context("ffmpeg is not runnable")?;
    Ok(())
}
