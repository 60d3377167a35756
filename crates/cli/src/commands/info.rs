//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{value_change_key, SchedulerKind, ThrottlerBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    throttle: ThrottleInfo,
    scheduler: SchedulerInfo,
    channel_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    channels: Vec<ChannelInfo>,
}

#[derive(Serialize)]
struct ThrottleInfo {
    throttle_interval_secs: f64,
    max_per_queue: usize,
    strategy: String,
    global_max: usize,
}

#[derive(Serialize)]
struct SchedulerInfo {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fps: Option<f64>,
}

#[derive(Serialize)]
struct ChannelInfo {
    name: String,
    key: String,
    sample_rate_hz: f64,
    amplitude: f64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &ThrottlerBlueprint, args: &InfoArgs) -> ConfigInfo {
    let throttle = &blueprint.throttle;
    let scheduler = &blueprint.scheduler;

    let channels = if args.channels {
        blueprint
            .channels
            .iter()
            .map(|c| ChannelInfo {
                name: c.name.clone(),
                key: value_change_key(&c.name),
                sample_rate_hz: c.sample_rate_hz,
                amplitude: c.amplitude,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        throttle: ThrottleInfo {
            throttle_interval_secs: throttle.throttle_interval_secs,
            max_per_queue: throttle.max_per_queue,
            strategy: throttle.strategy.to_string(),
            global_max: throttle.global_max,
        },
        scheduler: SchedulerInfo {
            kind: format!("{:?}", scheduler.kind),
            fps: (scheduler.kind == SchedulerKind::Frame).then_some(scheduler.fps),
        },
        channel_count: blueprint.channels.len(),
        channels,
    }
}

fn print_config_info(blueprint: &ThrottlerBlueprint, args: &InfoArgs) {
    let throttle = &blueprint.throttle;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Throttler Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⏱  Throttle");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Interval: {}s", throttle.throttle_interval_secs);
    println!("   ├─ Max per queue: {}", throttle.max_per_queue);
    println!("   ├─ Strategy: {}", throttle.strategy);
    println!("   └─ Global max: {}", throttle.global_max);

    println!("\n⚙️  Scheduler");
    match blueprint.scheduler.kind {
        SchedulerKind::Frame => {
            println!("   └─ Frame ({} fps)", blueprint.scheduler.fps);
        }
        SchedulerKind::Tokio => {
            println!("   └─ Tokio timers");
        }
    }

    println!("\n📡 Channels ({})", blueprint.channels.len());
    if args.channels {
        for (i, channel) in blueprint.channels.iter().enumerate() {
            let is_last = i == blueprint.channels.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!(
                "   {} {} (key {}, {} Hz, amplitude {})",
                prefix,
                channel.name,
                value_change_key(&channel.name),
                channel.sample_rate_hz,
                channel.amplitude
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ChannelConfig;

    #[test]
    fn test_build_info_with_channels() {
        let blueprint = ThrottlerBlueprint {
            version: Default::default(),
            throttle: Default::default(),
            scheduler: Default::default(),
            channels: vec![ChannelConfig::new("chan1")],
        };
        let args = InfoArgs {
            config: "throttler.toml".into(),
            json: true,
            channels: true,
        };

        let info = build_config_info(&blueprint, &args);
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.channels[0].key, "value_change_chan1");
        assert_eq!(info.scheduler.fps, None);
        assert_eq!(info.throttle.strategy, "drop_oldest");
    }
}
