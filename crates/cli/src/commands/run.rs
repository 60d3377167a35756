//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{ThrottleConfig, ThrottlerBlueprint};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Simulation, SimulationConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args)?;

    info!(
        throttle_interval_secs = blueprint.throttle.throttle_interval_secs,
        max_per_queue = blueprint.throttle.max_per_queue,
        strategy = %blueprint.throttle.strategy,
        global_max = blueprint.throttle.global_max,
        scheduler = ?blueprint.scheduler.kind,
        channels = blueprint.channels.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let simulation = Simulation::new(SimulationConfig {
        blueprint,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        max_samples: (args.max_samples > 0).then_some(args.max_samples),
        stats_interval: Duration::from_secs(args.stats_interval.max(1)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting simulation...");

    let stats = simulation
        .run(shutdown_signal())
        .await
        .context("Simulation failed")?;

    stats.print_summary();

    info!("Throttler finished");
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(blueprint: &mut ThrottlerBlueprint, args: &RunArgs) -> Result<(), CliError> {
    if args.conservative {
        let safe = ThrottleConfig::conservative();
        info!(
            max_per_queue = safe.max_per_queue,
            strategy = %safe.strategy,
            global_max = safe.global_max,
            "Applying conservative limits"
        );
        blueprint.throttle = blueprint.throttle.clone().with_limits(
            safe.max_per_queue,
            safe.strategy,
            safe.global_max,
        );
    }
    if let Some(interval) = args.interval {
        info!(interval, "Overriding throttle interval from CLI");
        blueprint.throttle.throttle_interval_secs = interval;
    }
    if let Some(strategy) = args.strategy {
        info!(strategy = %strategy, "Overriding overflow strategy from CLI");
        blueprint.throttle.strategy = strategy;
    }

    blueprint.throttle.validate()?;
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ThrottlerBlueprint) {
    let throttle = &blueprint.throttle;
    println!("\n=== Configuration Summary ===\n");
    println!("Throttle:");
    println!("  Interval: {}s", throttle.throttle_interval_secs);
    println!("  Max per queue: {}", throttle.max_per_queue);
    println!("  Strategy: {}", throttle.strategy);
    println!("  Global max: {}", throttle.global_max);

    println!("\nScheduler: {:?}", blueprint.scheduler.kind);

    println!("\nChannels ({}):", blueprint.channels.len());
    for channel in &blueprint.channels {
        println!(
            "  - {} ({} Hz, amplitude {})",
            channel.name, channel.sample_rate_hz, channel.amplitude
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use contracts::OverflowStrategy;

    use crate::cli::{Cli, Commands};

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["throttler", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_overrides_applied() {
        let mut bp = ThrottlerBlueprint {
            version: Default::default(),
            throttle: ThrottleConfig::default(),
            scheduler: Default::default(),
            channels: Vec::new(),
        };
        let args = run_args(&["--conservative", "--interval", "0.25", "--strategy", "skip_new"]);

        apply_overrides(&mut bp, &args).unwrap();

        assert_eq!(bp.throttle.throttle_interval_secs, 0.25);
        assert_eq!(bp.throttle.max_per_queue, 5);
        assert_eq!(bp.throttle.global_max, 50);
        assert_eq!(bp.throttle.strategy, OverflowStrategy::SkipNew);
    }

    #[test]
    fn test_invalid_interval_override_rejected() {
        let mut bp = ThrottlerBlueprint {
            version: Default::default(),
            throttle: ThrottleConfig::default(),
            scheduler: Default::default(),
            channels: Vec::new(),
        };
        let args = run_args(&["--interval=-1"]);

        assert!(apply_overrides(&mut bp, &args).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_fails() {
        let args = run_args(&["--config", "/nonexistent/throttler.toml"]);
        let err = run_pipeline(&args).await.unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[tokio::test]
    async fn test_dry_run_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throttler.toml");
        std::fs::write(&path, "[[channels]]\nname = \"chan1\"\n").unwrap();

        let args = run_args(&["--config", path.to_str().unwrap(), "--dry-run"]);
        run_pipeline(&args).await.unwrap();
    }
}
