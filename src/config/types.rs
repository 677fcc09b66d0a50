//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// 主配置结构，包含全局配置和监控URL列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 监控目标列表
    #[serde(default)]
    pub urls: Vec<UrlConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 邮件通知配置（未配置时只记录日志）
    pub email: Option<EmailConfig>,
    /// 最大并发检测数
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// 每次派发后的间隔
    #[serde(default = "default_sleep_time_url", with = "crate::config::duration")]
    pub sleep_time_url: Duration,
    /// 每轮调度之间的间隔
    #[serde(default = "default_sleep_time_batch", with = "crate::config::duration")]
    pub sleep_time_batch: Duration,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// 邮件（SMTP）配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    /// SMTP服务器地址
    pub host: String,
    /// 登录用户名，同时作为发件地址
    pub user_name: String,
    /// 登录密码
    #[serde(default)]
    pub password: String,
    /// SMTP端口
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// 是否启用STARTTLS
    #[serde(default)]
    pub ssl: bool,
    /// 邮件主题
    #[serde(default = "default_subject")]
    pub subject: String,
    /// 发件人显示名称
    #[serde(default = "default_from")]
    pub from: String,
}

/// 请求头
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
}

/// 单个监控目标配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlConfig {
    /// 目标URL，同时作为唯一标识
    pub path: String,
    /// HTTP方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 文本请求体
    pub post_text: Option<String>,
    /// 原始字节请求体，优先于 post_text
    pub post_bytes: Option<Vec<u8>>,
    /// 状态码匹配规则
    pub status_code_regex: Option<String>,
    /// 响应头匹配规则（任意一行 `Name:Value` 匹配即可）
    pub headers_regex: Option<String>,
    /// 响应体匹配规则
    pub body_regex: Option<String>,
    /// 响应内容变化时告警
    #[serde(default)]
    pub alert_if_changed: bool,
    /// 收件人列表，以 `,` `;` `|` 分隔
    #[serde(default)]
    pub email_addresses: String,
    /// 请求头（保持配置顺序）
    #[serde(default)]
    pub headers: Vec<HeaderConfig>,
    /// 检测频率
    #[serde(default = "default_frequency", with = "crate::config::duration")]
    pub frequency: Duration,
    /// 最大响应时间，0 表示不检查
    #[serde(default, with = "crate::config::duration")]
    pub max_time: Duration,
    /// 是否跳过证书校验（自签名证书的目标需要显式开启）
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// 默认值函数
fn default_max_threads() -> usize {
    10
}
fn default_sleep_time_url() -> Duration {
    Duration::from_millis(100)
}
fn default_sleep_time_batch() -> Duration {
    Duration::from_secs(1)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_smtp_port() -> u16 {
    25
}
fn default_subject() -> String {
    "URL monitor alert".to_string()
}
fn default_from() -> String {
    "URL Vitals".to_string()
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_frequency() -> Duration {
    Duration::from_secs(60)
}
fn default_enabled() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            email: None,
            max_threads: default_max_threads(),
            sleep_time_url: default_sleep_time_url(),
            sleep_time_batch: default_sleep_time_batch(),
            log_level: default_log_level(),
        }
    }
}

impl UrlConfig {
    /// 以默认值创建目标配置
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: default_method(),
            post_text: None,
            post_bytes: None,
            status_code_regex: None,
            headers_regex: None,
            body_regex: None,
            alert_if_changed: false,
            email_addresses: String::new(),
            headers: Vec::new(),
            frequency: default_frequency(),
            max_time: Duration::ZERO,
            accept_invalid_certs: false,
            enabled: default_enabled(),
        }
    }
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.global.max_threads == 0 {
        return Err("最大并发检测数(max_threads)不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if let Some(ref email) = config.global.email {
        if email.host.trim().is_empty() {
            return Err("邮件服务器地址(email.host)不能为空".to_string());
        }
        if email.user_name.trim().is_empty() {
            return Err("邮件用户名(email.user_name)不能为空".to_string());
        }
        if email.port == 0 {
            return Err("邮件服务器端口不能为0".to_string());
        }
    }

    if config.urls.is_empty() {
        return Err("至少需要配置一个监控URL".to_string());
    }

    let mut seen = HashSet::new();
    let valid_methods = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

    for url in &config.urls {
        let path = url.path.trim();
        if path.is_empty() {
            return Err("监控URL(path)不能为空".to_string());
        }

        if !path.starts_with("http://") && !path.starts_with("https://") {
            return Err(format!("监控URL {} 格式无效", url.path));
        }

        // 目标以去除首尾空白后的路径区分
        if !seen.insert(path) {
            return Err(format!("监控URL {} 重复配置", path));
        }

        if !valid_methods.contains(&url.method.to_uppercase().as_str()) {
            return Err(format!(
                "监控URL {} 的HTTP方法 {} 无效，支持的方法: {:?}",
                url.path, url.method, valid_methods
            ));
        }

        for header in &url.headers {
            if header.name.trim().is_empty() {
                return Err(format!("监控URL {} 存在空的请求头名称", url.path));
            }
        }
    }

    Ok(())
}
