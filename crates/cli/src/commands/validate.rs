//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{SchedulerKind, ThrottlerBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    throttle_interval_secs: f64,
    max_per_queue: usize,
    strategy: String,
    global_max: usize,
    scheduler: String,
    channel_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    throttle_interval_secs: blueprint.throttle.throttle_interval_secs,
                    max_per_queue: blueprint.throttle.max_per_queue,
                    strategy: blueprint.throttle.strategy.to_string(),
                    global_max: blueprint.throttle.global_max,
                    scheduler: format!("{:?}", blueprint.scheduler.kind),
                    channel_count: blueprint.channels.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ThrottlerBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let throttle = &blueprint.throttle;

    if blueprint.channels.is_empty() {
        warnings.push("No channels configured - nothing will be submitted".to_string());
    }

    if throttle.global_below_per_queue() {
        warnings.push(format!(
            "global_max ({}) is below max_per_queue ({}) - the global limit caps every queue",
            throttle.global_max, throttle.max_per_queue
        ));
    }

    if throttle.throttle_interval_secs == 0.0 {
        warnings.push("throttle_interval_secs is 0 - calls are never throttled".to_string());
    }

    // Frames longer than the interval make the effective interval one frame
    if blueprint.scheduler.kind == SchedulerKind::Frame
        && throttle.throttle_interval_secs > 0.0
        && throttle.throttle_interval_secs < 1.0 / blueprint.scheduler.fps
    {
        warnings.push(format!(
            "throttle interval ({}s) is shorter than one frame at {} fps",
            throttle.throttle_interval_secs, blueprint.scheduler.fps
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Interval: {}s", summary.throttle_interval_secs);
            println!(
                "  Limits: {} per queue ({}), {} total",
                summary.max_per_queue, summary.strategy, summary.global_max
            );
            println!("  Scheduler: {}", summary.scheduler);
            println!("  Channels: {}", summary.channel_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_for(path: PathBuf) -> ValidateArgs {
        ValidateArgs {
            config: path,
            json: true,
        }
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_config(&args_for(PathBuf::from("/nonexistent/throttler.toml")));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_valid_file_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throttler.toml");
        std::fs::write(
            &path,
            "[throttle]\nmax_per_queue = 20\nglobal_max = 10\n",
        )
        .unwrap();

        let result = validate_config(&args_for(path));
        assert!(result.valid, "error: {:?}", result.error);

        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No channels")));
        assert!(warnings.iter().any(|w| w.contains("global_max")));
    }

    #[test]
    fn test_invalid_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throttler.toml");
        std::fs::write(&path, "[throttle]\nmax_per_queue = 0\n").unwrap();

        let result = validate_config(&args_for(path));
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
