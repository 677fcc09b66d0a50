//! 通知模块
//!
//! 提供邮件通知和消息模板功能

pub mod email;
pub mod sender;
pub mod template;

use crate::config::types::EmailConfig;
use crate::error::NotificationError;
use std::sync::Arc;

// 重新导出主要类型
pub use email::EmailSender;
pub use sender::{NoOpSender, NotificationSender};
pub use template::{AlertContext, AlertTemplate};

/// 根据配置创建通知发送器，未配置邮件时告警只写入日志
pub fn build_sender(
    email: Option<&EmailConfig>,
) -> Result<Arc<dyn NotificationSender>, NotificationError> {
    match email {
        Some(config) => Ok(Arc::new(EmailSender::new(config)?)),
        None => Ok(Arc::new(NoOpSender)),
    }
}
