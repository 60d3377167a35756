//! 配置校验模块
//!
//! 校验规则：
//! - 节流参数合法 (间隔有限且 >= 0，容量 >= 1)
//! - 调度器帧率 > 0
//! - 通道名称非空且唯一
//! - sample_rate_hz > 0

use std::collections::HashSet;

use contracts::{ContractError, ThrottlerBlueprint};

/// 校验 ThrottlerBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ThrottlerBlueprint) -> Result<(), ContractError> {
    blueprint.throttle.validate()?;
    validate_scheduler(blueprint)?;
    validate_channel_names(blueprint)?;
    validate_channel_rates(blueprint)?;
    Ok(())
}

/// 校验调度器帧率
fn validate_scheduler(blueprint: &ThrottlerBlueprint) -> Result<(), ContractError> {
    let fps = blueprint.scheduler.fps;
    if !fps.is_finite() || fps <= 0.0 {
        return Err(ContractError::config_validation(
            "scheduler.fps",
            format!("fps must be > 0, got {fps}"),
        ));
    }
    Ok(())
}

/// 校验通道名称
fn validate_channel_names(blueprint: &ThrottlerBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, channel) in blueprint.channels.iter().enumerate() {
        if channel.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("channels[{idx}].name"),
                "channel name cannot be empty",
            ));
        }
        if !seen.insert(channel.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("channels[name={}]", channel.name),
                "duplicate channel name",
            ));
        }
    }
    Ok(())
}

/// 校验通道采样率
fn validate_channel_rates(blueprint: &ThrottlerBlueprint) -> Result<(), ContractError> {
    for channel in &blueprint.channels {
        if !channel.sample_rate_hz.is_finite() || channel.sample_rate_hz <= 0.0 {
            return Err(ContractError::config_validation(
                format!("channels[{}].sample_rate_hz", channel.name),
                format!(
                    "sample_rate_hz must be > 0, got {}",
                    channel.sample_rate_hz
                ),
            ));
        }
    }
    Ok(())
}
