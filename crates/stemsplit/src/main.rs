//! Stemsplit - separate an audio file into stems with spleeter or demucs
//!
//! Picks a backend, runs it on one input file and writes the stems under
//! the output directory.
//!
//! ## Exit codes
//!
//! - `0`: stems written, or the run failed in a way that was logged and contained
//!   (missing input, demucs model load, inference or IO faults)
//! - `70`: unrecognized separation tool
//! - `1`: any other failure

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use settings::{default_settings_path, load_settings, save_settings, Settings};
use stemsplit_core::{
    FaultClass, SeparationError, SeparationOutcome, SeparatorConfig, SeparatorFactory,
};

/// Successful termination (sysexits.h)
const EX_OK: u8 = 0;

/// Internal software error (sysexits.h)
const EX_SOFTWARE: u8 = 70;

/// Uncontained failure
const EX_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "stemsplit",
    about = "Separate audio sources using Spleeter or Demucs."
)]
struct Cli {
    /// The separation tool to use: spleeter or demucs (default: demucs)
    #[arg(short, long)]
    tool: Option<String>,

    /// Path to the input audio file (default: sample_audio/tijucos-no-dia-que-de.mp3)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to the output folder (default: output_stems/<tool>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model identifier for the selected tool
    /// (default: spleeter:5stems for spleeter, htdemucs for demucs)
    #[arg(short, long)]
    model: Option<String>,

    /// Settings file (default: ~/.config/stemsplit/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the current settings (defaults for anything unset) to the settings file and exit
    #[arg(long)]
    write_config: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Everything needed for one separation run
#[derive(Debug, PartialEq)]
struct RunPlan {
    config: SeparatorConfig,
    input: PathBuf,
    output: PathBuf,
}

/// Merge command-line flags over settings
///
/// Fails with `InvalidArgument` when the tool name is not a known backend.
fn resolve_plan(cli: &Cli, settings: &Settings) -> Result<RunPlan, SeparationError> {
    let tool = cli.tool.as_deref().unwrap_or(&settings.backend);
    let mut config = SeparatorFactory::config_from_name(tool, &settings.backends)?;
    if let Some(model) = &cli.model {
        config = config.with_model_name(model.clone());
    }

    let input = cli.input.clone().unwrap_or_else(|| settings.input.clone());
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| settings.output_root.join(config.kind().as_str()));

    Ok(RunPlan {
        config,
        input,
        output,
    })
}

fn run(cli: Cli) -> Result<u8> {
    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);

    if cli.write_config {
        save_settings(&settings, &settings_path)?;
        return Ok(EX_OK);
    }

    let plan = match resolve_plan(&cli, &settings) {
        Ok(plan) => plan,
        Err(e) => {
            log::error!("Terminating due to error: {}", e);
            return Ok(EX_SOFTWARE);
        }
    };

    let separator = SeparatorFactory::create_with(plan.config);
    log::info!(
        "Separating {} with {} into {}",
        plan.input.display(),
        separator.name(),
        plan.output.display()
    );

    match separator.separate(&plan.input, &plan.output) {
        Ok(SeparationOutcome::Completed) => Ok(EX_OK),
        Ok(SeparationOutcome::Contained(e)) => {
            log::warn!("Separation did not complete: {}", e);
            Ok(EX_OK)
        }
        // Already logged by the separator; a bad path is not a crash
        Err(e) if e.fault_class() == FaultClass::NotFound => Ok(EX_OK),
        Err(e) => Err(anyhow::Error::new(e).context("Separation failed")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set RUST_LOG=debug for verbose output
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(EX_FAILURE)
        }
    }
}
