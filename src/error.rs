//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// URL Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum UrlVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测相关错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 正则表达式编译失败
    #[error("目标 {path} 的 {field} 无效: {source}")]
    InvalidPattern {
        path: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// 探测错误类型
///
/// 传输层失败只记录日志，不会触发告警。
#[derive(Error, Debug)]
pub enum ProbeError {
    /// HTTP请求错误（DNS、连接、TLS握手、读取响应体）
    #[error("HTTP请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP客户端构建失败
    #[error("HTTP客户端创建失败: {0}")]
    ClientBuild(String),
}

impl ProbeError {
    /// 返回便于阅读的失败原因
    pub fn reason(&self) -> String {
        match self {
            ProbeError::Transport(e) if e.is_timeout() => "Request timeout".to_string(),
            ProbeError::Transport(e) if e.is_connect() => "Connection failed".to_string(),
            ProbeError::Transport(e) if e.is_body() || e.is_decode() => {
                "Response body read failed".to_string()
            }
            ProbeError::Transport(e) => format!("Request failed: {e}"),
            ProbeError::ClientBuild(msg) => msg.clone(),
        }
    }
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),

    /// 收件人地址无效
    #[error("无效的收件人地址: {address}")]
    InvalidRecipient { address: String },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, UrlVitalsError>;
