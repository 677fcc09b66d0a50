//! 监控目标定义
//!
//! 将 `UrlConfig` 编译为不可变的 `TargetSpec`：解析HTTP方法和请求头，
//! 预编译正则表达式并拆分收件人列表。编译在配置加载时完成，
//! 运行期间目标以 `Arc<TargetSpec>` 在调度器与检测任务之间共享。

use crate::config::types::{Config, UrlConfig};
use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// 请求体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Bytes(Vec<u8>),
    Text(String),
}

impl RequestBody {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Bytes(bytes) => bytes.clone(),
            RequestBody::Text(text) => text.as_bytes().to_vec(),
        }
    }
}

/// 响应校验规则
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub status_pattern: Option<Regex>,
    pub header_pattern: Option<Regex>,
    pub body_pattern: Option<Regex>,
    /// 为零时不检查响应时间
    pub max_duration: Duration,
    pub alert_on_change: bool,
}

/// 编译后的监控目标
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// 目标URL，同时作为唯一标识
    pub path: String,
    pub url: Url,
    pub method: Method,
    pub body: Option<RequestBody>,
    /// 请求头，保持配置顺序
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub rules: RuleSet,
    pub recipients: Vec<String>,
    pub frequency: Duration,
    pub accept_invalid_certs: bool,
}

impl TargetSpec {
    /// 当前方法是否携带请求体
    pub fn sends_body(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

/// 拆分以 `,` `;` `|` 分隔的收件人列表
pub fn parse_recipients(addresses: &str) -> Vec<String> {
    addresses
        .split([',', ';', '|'])
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

fn compile_pattern(
    path: &str,
    field: &'static str,
    pattern: Option<&str>,
    dot_matches_new_line: bool,
) -> Result<Option<Regex>, ConfigError> {
    let Some(pattern) = pattern.filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };

    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(dot_matches_new_line)
        .build()
        .map(Some)
        .map_err(|source| ConfigError::InvalidPattern {
            path: path.to_string(),
            field,
            source,
        })
}

impl TryFrom<&UrlConfig> for TargetSpec {
    type Error = ConfigError;

    fn try_from(config: &UrlConfig) -> Result<Self, Self::Error> {
        let path = config.path.trim().to_string();

        let url = Url::parse(&path).map_err(|e| {
            ConfigError::ValidationError(format!("监控URL {path} 无法解析: {e}"))
        })?;

        let method = Method::from_bytes(config.method.trim().to_uppercase().as_bytes())
            .map_err(|_| {
                ConfigError::ValidationError(format!(
                    "监控URL {} 的HTTP方法 {} 无效",
                    path, config.method
                ))
            })?;

        let body = match (&config.post_bytes, &config.post_text) {
            (Some(bytes), _) => Some(RequestBody::Bytes(bytes.clone())),
            (None, Some(text)) => Some(RequestBody::Text(text.clone())),
            (None, None) => None,
        };

        let mut headers = Vec::with_capacity(config.headers.len());
        for header in &config.headers {
            let name = HeaderName::from_bytes(header.name.trim().as_bytes()).map_err(|_| {
                ConfigError::ValidationError(format!(
                    "监控URL {} 的请求头名称 {:?} 无效",
                    path, header.name
                ))
            })?;
            let value = HeaderValue::from_str(&header.value).map_err(|_| {
                ConfigError::ValidationError(format!(
                    "监控URL {} 的请求头 {} 的值无效",
                    path, header.name
                ))
            })?;
            headers.push((name, value));
        }

        let rules = RuleSet {
            status_pattern: compile_pattern(
                &path,
                "status_code_regex",
                config.status_code_regex.as_deref(),
                false,
            )?,
            header_pattern: compile_pattern(
                &path,
                "headers_regex",
                config.headers_regex.as_deref(),
                true,
            )?,
            body_pattern: compile_pattern(&path, "body_regex", config.body_regex.as_deref(), true)?,
            max_duration: config.max_time,
            alert_on_change: config.alert_if_changed,
        };

        Ok(Self {
            path,
            url,
            method,
            body,
            headers,
            rules,
            recipients: parse_recipients(&config.email_addresses),
            frequency: config.frequency,
            accept_invalid_certs: config.accept_invalid_certs,
        })
    }
}

/// 编译配置中所有启用的目标
pub fn compile_targets(config: &Config) -> Result<Vec<Arc<TargetSpec>>, ConfigError> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(config.urls.len());

    for url in config.urls.iter().filter(|url| url.enabled) {
        let spec = TargetSpec::try_from(url)?;
        if !seen.insert(spec.path.clone()) {
            return Err(ConfigError::ValidationError(format!(
                "监控URL {} 重复配置",
                spec.path
            )));
        }
        targets.push(Arc::new(spec));
    }

    Ok(targets)
}
