//! 核心模块
//!
//! 包含应用程序的核心逻辑和生命周期管理

pub mod app;
pub mod service;
pub mod signal_handler;

// 重新导出主要类型
pub use app::execute_command;
pub use service::{MonitorService, ServiceLauncher};
pub use signal_handler::{setup_signal_handlers, ControlEvent};
