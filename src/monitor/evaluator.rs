//! 响应校验
//!
//! 每条已配置的规则独立检查，违规信息累积而不是在第一条失败时返回。
//! 保存的指纹总是被最新观测值覆盖，与校验结果无关。

use crate::monitor::fingerprint::Fingerprint;
use crate::monitor::probe::ProbeResult;
use crate::monitor::target::RuleSet;
use serde::Serialize;
use std::fmt;

/// 违规信息列表，为空表示无需告警
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    fn push(&mut self, message: String) {
        self.0.push(message);
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, message) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {message}")?;
        }
        Ok(())
    }
}

/// 按规则校验探测结果
///
/// # 参数
/// * `rules` - 目标的校验规则
/// * `result` - 探测结果
/// * `stored` - 上次保存的指纹，校验后被替换为本次观测值
///
/// # 返回
/// * `Violations` - 违规信息
pub fn evaluate(rules: &RuleSet, result: &ProbeResult, stored: &mut Fingerprint) -> Violations {
    let mut violations = Violations::default();

    if let Some(pattern) = &rules.status_pattern {
        let code = result.status_code.to_string();
        if !pattern.is_match(&code) {
            violations.push(format!("Failed to match status code regex, got {code}"));
        }
    }

    if let Some(pattern) = &rules.header_pattern {
        if !result.headers.iter().any(|line| pattern.is_match(line)) {
            violations.push("Failed to match headers regex".to_string());
        }
    }

    if let Some(pattern) = &rules.body_pattern {
        if !pattern.is_match(&result.body) {
            violations.push("Failed to match body regex".to_string());
        }
    }

    if rules.alert_on_change && !stored.is_zero() && *stored != result.fingerprint {
        violations.push(format!(
            "Body contents changed, fingerprint {} -> {}",
            stored, result.fingerprint
        ));
    }

    if !rules.max_duration.is_zero() && result.elapsed > rules.max_duration {
        violations.push(format!(
            "URL took {:.2} seconds, longer than the {:.2} second limit",
            result.elapsed.as_secs_f64(),
            rules.max_duration.as_secs_f64()
        ));
    }

    *stored = result.fingerprint;
    violations
}
