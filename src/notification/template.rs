//! 消息模板模块
//!
//! 使用 Handlebars 渲染HTML告警邮件

use crate::error::NotificationError;
use crate::monitor::evaluator::Violations;
use crate::monitor::probe::ProbeResult;
use crate::monitor::target::TargetSpec;
use handlebars::Handlebars;
use serde::Serialize;

const ALERT_TEMPLATE_NAME: &str = "alert";

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub target: String,
    pub method: String,
    pub status_code: u16,
    pub elapsed_ms: u128,
    pub timestamp: String,
    pub violations: Vec<String>,
}

impl AlertContext {
    pub fn new(target: &TargetSpec, result: &ProbeResult, violations: &Violations) -> Self {
        Self {
            target: target.path.clone(),
            method: target.method.to_string(),
            status_code: result.status_code,
            elapsed_ms: result.elapsed.as_millis(),
            timestamp: result.checked_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            violations: violations.messages().to_vec(),
        }
    }
}

/// 告警邮件模板
pub struct AlertTemplate {
    registry: Handlebars<'static>,
}

impl AlertTemplate {
    /// 使用默认模板创建
    pub fn new() -> Result<Self, NotificationError> {
        Self::with_template(default_alert_template())
    }

    /// 使用自定义模板创建
    ///
    /// # 参数
    /// * `template` - Handlebars模板字符串
    pub fn with_template(template: &str) -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string(ALERT_TEMPLATE_NAME, template)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;

        Ok(Self { registry })
    }

    /// 渲染模板
    pub fn render(&self, context: &AlertContext) -> Result<String, NotificationError> {
        self.registry
            .render(ALERT_TEMPLATE_NAME, context)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))
    }
}

/// 默认的告警邮件模板
pub fn default_alert_template() -> &'static str {
    r#"<html>
<body style="font-family: sans-serif;">
<h3>URL check failed: {{target}}</h3>
<ul>
{{#each violations}}
  <li>{{this}}</li>
{{/each}}
</ul>
<table>
  <tr><td>Method</td><td>{{method}}</td></tr>
  <tr><td>Status code</td><td>{{status_code}}</td></tr>
  <tr><td>Elapsed</td><td>{{elapsed_ms}} ms</td></tr>
  <tr><td>Checked at</td><td>{{timestamp}}</td></tr>
</table>
</body>
</html>"#
}
