//! 邮件通知发送器模块
//!
//! 通过 SMTP 发送HTML告警邮件，每个违规目标一封，发送给该目标的全部收件人

use crate::config::types::EmailConfig;
use crate::error::NotificationError;
use crate::monitor::evaluator::Violations;
use crate::monitor::probe::ProbeResult;
use crate::monitor::target::TargetSpec;
use crate::notification::sender::NotificationSender;
use crate::notification::template::{AlertContext, AlertTemplate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

/// 邮件通知发送器
pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// 同时用作 From 和 Sender
    from: Mailbox,
    subject: String,
    template: AlertTemplate,
}

impl EmailSender {
    /// 创建新的邮件发送器
    ///
    /// # 参数
    /// * `config` - 邮件配置
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 发送器实例
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let builder = if config.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotificationError::ConfigError(format!("SMTP TLS配置失败: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if !config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user_name.clone(),
                config.password.clone(),
            ));
        }

        let address: Address = config.user_name.parse().map_err(|_| {
            NotificationError::ConfigError(format!(
                "发件地址 {} 不是有效的邮件地址",
                config.user_name
            ))
        })?;
        let display_name = Some(config.from.clone()).filter(|name| !name.trim().is_empty());

        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(display_name, address),
            subject: config.subject.clone(),
            template: AlertTemplate::new()?,
        })
    }

    /// 构建邮件，无效的收件人地址会被跳过
    fn build_message(
        &self,
        recipients: &[String],
        html: String,
    ) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .sender(self.from.clone())
            .subject(self.subject.clone())
            .header(ContentType::TEXT_HTML);

        let mut accepted = 0;
        for recipient in recipients {
            match recipient.parse::<Mailbox>() {
                Ok(mailbox) => {
                    builder = builder.to(mailbox);
                    accepted += 1;
                }
                Err(_) => {
                    warn!("跳过无效的收件人地址: {}", recipient);
                }
            }
        }

        if accepted == 0 {
            return Err(NotificationError::InvalidRecipient {
                address: recipients.join(", "),
            });
        }

        builder
            .body(html)
            .map_err(|e| NotificationError::SendError(format!("构建邮件失败: {e}")))
    }

    async fn deliver(&self, message: Message) -> Result<()> {
        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::SendError(e.to_string()))
            .context("SMTP发送失败")?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send_alert(
        &self,
        target: &TargetSpec,
        result: &ProbeResult,
        violations: &Violations,
    ) -> Result<()> {
        if target.recipients.is_empty() {
            debug!("目标 {} 未配置收件人，跳过邮件通知", target.path);
            return Ok(());
        }

        let html = self
            .template
            .render(&AlertContext::new(target, result, violations))?;
        let message = self.build_message(&target.recipients, html)?;
        self.deliver(message).await?;

        info!(
            url = %target.path,
            recipients = target.recipients.len(),
            "告警邮件发送成功"
        );
        Ok(())
    }

    async fn send_test(&self, recipients: &[String]) -> Result<()> {
        let context = AlertContext {
            target: "https://example.com/url-vitals-test".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            elapsed_ms: 0,
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            violations: vec!["This is a test message from url-vitals".to_string()],
        };
        let html = self.template.render(&context)?;
        let message = self.build_message(recipients, html)?;
        self.deliver(message).await?;

        info!("测试邮件已发送到 {} 个收件人", recipients.len());
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        let connected = self
            .transport
            .test_connection()
            .await
            .context("连接SMTP服务器失败")?;

        if connected {
            Ok(())
        } else {
            Err(NotificationError::SendError("SMTP服务器未响应NOOP".to_string()).into())
        }
    }
}
