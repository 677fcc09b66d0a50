//! 通知发送器模块
//!
//! 定义通知发送的trait和基础实现

use crate::monitor::evaluator::Violations;
use crate::monitor::probe::ProbeResult;
use crate::monitor::target::TargetSpec;
use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// 通知发送器trait
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送告警
    ///
    /// # 参数
    /// * `target` - 出现违规的监控目标
    /// * `result` - 本次探测结果
    /// * `violations` - 违规信息
    ///
    /// # 返回
    /// * `Result<()>` - 发送结果
    async fn send_alert(
        &self,
        target: &TargetSpec,
        result: &ProbeResult,
        violations: &Violations,
    ) -> Result<()>;

    /// 发送测试消息
    async fn send_test(&self, recipients: &[String]) -> Result<()>;

    /// 测试连接
    async fn test_connection(&self) -> Result<()>;
}

/// 未配置邮件时使用的发送器，告警只写入日志
pub struct NoOpSender;

#[async_trait]
impl NotificationSender for NoOpSender {
    async fn send_alert(
        &self,
        target: &TargetSpec,
        result: &ProbeResult,
        violations: &Violations,
    ) -> Result<()> {
        warn!(
            url = %target.path,
            status = result.status_code,
            "未配置邮件通知，告警内容:\n{}",
            violations
        );
        Ok(())
    }

    async fn send_test(&self, _recipients: &[String]) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}
