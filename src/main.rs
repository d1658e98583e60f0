//! CLI entry point for the playlist downloader.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use playlist_downloader::config::load_config;
use playlist_downloader::download::{DownloadEngine, EngineConfig, HttpClient};
use playlist_downloader::logging;
use playlist_downloader::manifest::{ManifestResolver, ManifestSource};
use playlist_downloader::operation::{OperationProgress, OperationStatus, TransferOrchestrator};
use playlist_downloader::playlist::{PlaylistArgs, PlaylistConfig, PlaylistDownloadOperation};
use playlist_downloader::remux::FfmpegRemuxer;
use tracing::{debug, info, warn};

mod cli;
mod progress_ui;

use cli::{Args, RunSettings};
use progress_ui::ProgressUi;

/// Exit code used when the run was interrupted, as for SIGINT.
const EXIT_CANCELED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref())?;
    let settings = RunSettings::resolve(&args, &loaded.config);

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let _log_guard = logging::init(
        logging::default_level(args.quiet, args.verbose),
        settings.log_dir.as_deref(),
    )?;

    debug!(?args, ?settings, config = ?loaded.path, from_file = loaded.loaded_from_file, "settings resolved");

    let client = HttpClient::try_new_with_timeouts(
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    )
    .context("Failed to build HTTP client")?;
    let engine = DownloadEngine::new(
        client,
        EngineConfig {
            chunk_size: settings.chunk_size,
            ..EngineConfig::default()
        },
    )?;

    let mut remuxer = FfmpegRemuxer::new(&settings.ffmpeg);
    if let Some(dir) = &settings.log_dir {
        remuxer = remuxer.with_log_dir(dir)?;
    }

    let operation = PlaylistDownloadOperation::new(
        engine,
        Arc::new(ManifestSource),
        Arc::new(ManifestResolver),
        Arc::new(remuxer),
        PlaylistConfig {
            delete_partial_on_cancel: !args.keep_partial,
            ..PlaylistConfig::default()
        },
    );

    let input = args.manifest.to_string_lossy().into_owned();
    let mut orchestrator = TransferOrchestrator::new(operation);
    let mut progress = orchestrator.start(PlaylistArgs::new(
        input,
        &settings.output_dir,
        settings.dash,
        settings.preferred_quality,
    ))?;
    info!(manifest = %args.manifest.display(), output = %settings.output_dir.display(), "Playlist download starting");

    let mut ui = ProgressUi::new(!args.quiet && io::stderr().is_terminal());
    let mut stopping = false;
    loop {
        tokio::select! {
            message = progress.recv() => {
                let Some(message) = message else { break };
                let finished = matches!(message, OperationProgress::Finished { .. });
                ui.apply(&message);
                if finished {
                    break;
                }
            }
            result = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                match result {
                    Ok(()) => {
                        info!("Cancel requested, stopping after cleanup");
                        orchestrator.stop();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
                }
            }
        }
    }
    ui.finish();

    let report = orchestrator
        .join()
        .await
        .context("Playlist operation ended without a report")?;

    for entry in report.worker.errors() {
        eprintln!("{entry}");
    }
    println!("{}", report.summary);

    let code = match report.status {
        OperationStatus::Success => ExitCode::SUCCESS,
        OperationStatus::Canceled => ExitCode::from(EXIT_CANCELED),
        _ => ExitCode::FAILURE,
    };
    Ok(code)
}
