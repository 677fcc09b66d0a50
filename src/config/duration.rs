//! 时长解析模块
//!
//! 配置中的时长既支持 `[d.]hh:mm:ss[.fraction]` 形式，也支持 humantime 形式（如 `250ms`、`5m`）

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// 解析时长字符串
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("时长不能为空".to_string());
    }

    if trimmed.contains(':') {
        return parse_clock(trimmed);
    }

    // 纯数字视为秒
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(trimmed).map_err(|e| format!("无效的时长 {trimmed:?}: {e}"))
}

/// 解析 `[d.]hh:mm:ss[.fraction]`
fn parse_clock(input: &str) -> Result<Duration, String> {
    let invalid = || format!("无效的时长 {input:?}，期望格式 [d.]hh:mm:ss[.fff]");

    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => (
            d.parse::<u64>().map_err(|_| invalid())?,
            h.parse::<u64>().map_err(|_| invalid())?,
        ),
        None => (0, parts[0].parse::<u64>().map_err(|_| invalid())?),
    };
    let minutes = parts[1].parse::<u64>().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    let (secs, nanos) = match parts[2].split_once('.') {
        Some((s, frac)) => {
            if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            // 最多保留9位小数
            let digits: String = frac.chars().take(9).collect();
            let scale = 10u32.pow(9 - digits.len() as u32);
            let nanos = digits.parse::<u32>().map_err(|_| invalid())? * scale;
            (s.parse::<u64>().map_err(|_| invalid())?, nanos)
        }
        None => (parts[2].parse::<u64>().map_err(|_| invalid())?, 0),
    };
    if secs > 59 {
        return Err(invalid());
    }

    let total = days
        .checked_mul(86_400)
        .and_then(|d| d.checked_add(hours * 3_600 + minutes * 60 + secs))
        .ok_or_else(invalid)?;
    Ok(Duration::new(total, nanos))
}

/// serde 适配：序列化为 humantime 字符串
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

/// serde 适配：从字符串或整数秒反序列化
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
    }
}
