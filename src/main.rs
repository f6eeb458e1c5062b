//! mediabatch - batch media processing
//!
//! Entry point: parses the command line, sets up logging, loads the
//! configuration and runs the selected command over the input files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mediabatch::cli::{Args, Commands, OutputArgs, PolicyArg, SchedulingArgs};
use mediabatch::config::{Config, PolicyKind, SchedulingConfig};
use mediabatch::media::{
    CombineOptions, FilterOptions, MediaProcessorFactory, SplitOptions, TitlecardOptions, TransformKind,
};
use mediabatch::naming::NamingConfig;
use mediabatch::scheduler::{FailurePolicy, RunReport};
use mediabatch::workflow::Workflow;

const LOG_FILE: &str = "mediabatch.log";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // The guard flushes the file writer when dropped at the end of main.
    let _guard = match setup_logging(args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<u8> {
    let config_path = args.config;

    let report = match args.command {
        Commands::InitConfig { path, force } => {
            init_config(&path, force)?;
            return Ok(0);
        }
        Commands::Auphonic {
            inputs,
            output,
            username,
            password,
            loudness_target,
            noise_reduction,
            poll_interval_ms,
            scheduling,
        } => {
            let mut config = Config::load(config_path.as_deref())?;
            apply_output_args(&mut config.output, &output);
            if let Some(username) = username {
                config.remote.username = username;
            }
            if let Some(password) = password {
                config.remote.password = password;
            }
            if let Some(target) = loudness_target {
                config.processing.loudness_target = target;
            }
            if noise_reduction {
                config.processing.noise_reduction = true;
            }
            if let Some(interval) = poll_interval_ms {
                config.remote.poll_interval_ms = interval;
            }
            apply_scheduling_args(&mut config.scheduling, &scheduling);

            info!("Sending {} input(s) to {}", inputs.len(), config.remote.base_url);
            let workflow = Workflow::new(config).with_cancellation(cancel_on_ctrl_c());
            workflow.process_remote(&inputs).await?
        }
        Commands::Filter {
            inputs,
            output,
            video_filter,
            audio_filter,
            speed,
            scheduling,
        } => {
            let kind = TransformKind::Filter(FilterOptions {
                naming: local_naming(&output, "filter", "-filter", None),
                video_filter,
                audio_filter,
                speed,
            });
            run_local(config_path.as_deref(), kind, &inputs, &scheduling).await?
        }
        Commands::Split {
            inputs,
            output_folder,
            output_suffix,
            output_video_extension,
            output_audio_extension,
            scheduling,
        } => {
            let output = OutputArgs {
                output_folder,
                output_suffix,
                output_extension: None,
            };
            let kind = TransformKind::Split(SplitOptions {
                naming: local_naming(&output, "split", "", None),
                video_extension: output_video_extension,
                audio_extension: output_audio_extension,
            });
            run_local(config_path.as_deref(), kind, &inputs, &scheduling).await?
        }
        Commands::Combine {
            inputs,
            output,
            audio_extension,
            audio_suffix,
            audio_folder,
            scheduling,
        } => {
            let kind = TransformKind::Combine(CombineOptions {
                naming: local_naming(&output, "combine", "", Some(".mp4")),
                audio_extension,
                audio_suffix,
                audio_folder,
            });
            run_local(config_path.as_deref(), kind, &inputs, &scheduling).await?
        }
        Commands::Titlecard {
            inputs,
            output,
            card_image,
            card_duration,
            scheduling,
        } => {
            let kind = TransformKind::Titlecard(TitlecardOptions {
                naming: local_naming(&output, "titlecard", "-titlecard", None),
                card_image,
                card_duration,
            });
            run_local(config_path.as_deref(), kind, &inputs, &scheduling).await?
        }
    };

    print_report(&report);
    Ok(report.exit_code() as u8)
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running jobs");
                cancel.cancel();
            }
        }
    });
    cancel
}

/// Local commands run one file at a time unless the command line says otherwise.
async fn run_local(
    config_path: Option<&Path>,
    kind: TransformKind,
    inputs: &[PathBuf],
    scheduling: &SchedulingArgs,
) -> Result<RunReport> {
    let mut config = Config::load(config_path)?;
    config.scheduling.policy = PolicyKind::Sequential;
    apply_scheduling_args(&mut config.scheduling, scheduling);
    let plan = config.scheduling.plan()?;

    let transform = MediaProcessorFactory::create_transform(&config.media, kind)?;
    let workflow = Workflow::new(config).with_cancellation(cancel_on_ctrl_c());
    Ok(workflow.process_local(transform.as_ref(), inputs, plan).await?)
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn apply_output_args(naming: &mut NamingConfig, output: &OutputArgs) {
    if let Some(folder) = &output.output_folder {
        naming.folder = folder.clone();
    }
    if let Some(suffix) = &output.output_suffix {
        naming.suffix = suffix.clone();
    }
    if let Some(extension) = &output.output_extension {
        naming.extension = Some(extension.clone());
    }
}

fn local_naming(output: &OutputArgs, folder: &str, suffix: &str, extension: Option<&str>) -> NamingConfig {
    let mut naming = NamingConfig::new(folder, suffix, extension);
    apply_output_args(&mut naming, output);
    naming
}

fn apply_scheduling_args(scheduling: &mut SchedulingConfig, args: &SchedulingArgs) {
    if let Some(policy) = args.policy {
        scheduling.policy = parse_policy(policy);
    }
    if let Some(batch_size) = args.batch_size {
        scheduling.batch_size = batch_size;
    }
    if args.collect_all {
        scheduling.failure_policy = FailurePolicy::CollectAll;
    }
}

fn parse_policy(policy: PolicyArg) -> PolicyKind {
    match policy {
        PolicyArg::Sequential => PolicyKind::Sequential,
        PolicyArg::Concurrent => PolicyKind::Concurrent,
        PolicyArg::Batched => PolicyKind::Batched,
    }
}

/// One line per failed file, then a summary.
fn print_report(report: &RunReport) {
    for outcome in report.failed() {
        println!(
            "{}: {}",
            outcome.source_path.display(),
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    for outcome in report.outcomes.iter().filter(|o| o.cleanup_error.is_some()) {
        warn!(
            "Remote job for {} was not deleted: {}",
            outcome.source_path.display(),
            outcome.cleanup_error.as_deref().unwrap_or_default()
        );
    }
    for file in &report.not_started {
        println!("{}: not started", file.display());
    }

    let succeeded = report.succeeded().count();
    let failed = report.failed().count();
    info!(
        "Done: {} succeeded, {} failed, {} not started",
        succeeded,
        failed,
        report.not_started.len()
    );
    if report.is_success() {
        println!("Processed {} file(s)", succeeded);
    }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".mediabatch").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join(LOG_FILE).display());

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_config_replaces_a_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mediabatch.toml");
        std::fs::write(&target, "[remote\nbase_url = ").unwrap();

        let args = Args::parse_from([
            "mediabatch",
            "--config",
            target.to_str().unwrap(),
            "init-config",
            target.to_str().unwrap(),
            "--force",
        ]);
        assert_eq!(run(args).await.unwrap(), 0);

        let written = Config::from_file(&target).unwrap();
        assert_eq!(written.remote.base_url, Config::default().remote.base_url);
    }

    #[tokio::test]
    async fn init_config_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mediabatch.toml");
        std::fs::write(&target, "# mine").unwrap();

        let args = Args::parse_from(["mediabatch", "init-config", target.to_str().unwrap()]);
        assert!(run(args).await.is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# mine");
    }
}
