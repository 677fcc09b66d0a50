//! URL Vitals - HTTP端点监控工具
//!
//! 按目标各自的频率探测URL，支持：
//! - 状态码、响应头、响应体的正则校验
//! - 响应内容变更检测和最长耗时限制
//! - 有界并发调度和优雅停止
//! - 邮件告警
//! - 配置热重载
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, UrlConfig};
pub use error::UrlVitalsError;
pub use monitor::{evaluate, Fingerprint, ProbeResult, TargetSpec, Violations};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
