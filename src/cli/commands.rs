//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, ConfigTemplate, OutputFormat};
use crate::config::{ConfigLoader, TomlConfigLoader};
use crate::core::service::ServiceLauncher;
use crate::error::{ConfigError, NotificationError, Result};
use crate::monitor::{compile_targets, evaluate, Fingerprint, HttpProber, Prober, TargetSpec};
use crate::notification::build_sender;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start { max_threads } = &args.command {
            ServiceLauncher::run_foreground(&args.get_config_path(), *max_threads).await?;
        }
        Ok(())
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init {
            config_path,
            force,
            template,
        } = &args.command
        {
            self.create_config_file(config_path, *force, *template).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(
        &self,
        config_path: &Path,
        force: bool,
        template: ConfigTemplate,
    ) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, template_content(template)).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要监控的URL");

        Ok(())
    }
}

/// 配置模板内容
pub fn template_content(template: ConfigTemplate) -> &'static str {
    match template {
        ConfigTemplate::Minimal => include_str!("../../demos/minimal_config.toml"),
        ConfigTemplate::Full => include_str!("../../demos/full_config.toml"),
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件，正则表达式也会在此编译
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;
        let targets = compile_targets(&config)?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  最大并发: {}", config.global.max_threads);
            println!(
                "  派发间隔: {}",
                humantime::format_duration(config.global.sleep_time_url)
            );
            println!(
                "  批次间隔: {}",
                humantime::format_duration(config.global.sleep_time_batch)
            );
            println!("  日志级别: {}", config.global.log_level);
            match &config.global.email {
                Some(email) => println!("  邮件服务器: {}:{}", email.host, email.port),
                None => println!("  邮件服务器: 未配置"),
            }

            println!("监控目标:");
            for (i, url) in config.urls.iter().enumerate() {
                println!("  {}. {} {}", i + 1, url.method, url.path);
                println!("     检测频率: {}", humantime::format_duration(url.frequency));
                if !url.max_time.is_zero() {
                    println!("     最长耗时: {}", humantime::format_duration(url.max_time));
                }
                println!("     内容变更告警: {}", if url.alert_if_changed { "是" } else { "否" });
                println!("     启用状态: {}", if url.enabled { "是" } else { "否" });
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!(
                "✓ 找到 {} 个监控目标，其中 {} 个已启用",
                config.urls.len(),
                targets.len()
            );
        }

        Ok(())
    }
}

/// 单个目标的一次性检测报告
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub path: String,
    pub status_code: Option<u16>,
    pub elapsed_ms: Option<u128>,
    pub fingerprint: Option<String>,
    pub violations: Vec<String>,
    /// 传输层失败原因
    pub error: Option<String>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.violations.is_empty()
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { path, format } = &args.command {
            self.perform_check(args, path.as_deref(), *format).await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    async fn perform_check(
        &self,
        args: &Args,
        path: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(args.get_config_path()).await?;

        let targets: Vec<Arc<TargetSpec>> = compile_targets(&config)?
            .into_iter()
            .filter(|target| path.map_or(true, |path| target.path == path))
            .collect();

        if targets.is_empty() {
            if let Some(path) = path {
                eprintln!("未找到启用的监控目标: {path}");
            } else {
                eprintln!("未找到任何启用的监控目标");
            }
            return Ok(());
        }

        let prober = HttpProber::new()?;
        let reports =
            futures::future::join_all(targets.iter().map(|target| check_once(&prober, target)))
                .await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            OutputFormat::Text => print_text_reports(&reports),
        }

        let failed = reports.iter().filter(|report| !report.passed()).count();
        if failed > 0 {
            return Err(anyhow::anyhow!("{} 个目标检测未通过", failed).into());
        }
        Ok(())
    }
}

/// 探测并校验一次，不发送通知
///
/// 一次性检测没有历史指纹，内容变更规则不会触发
pub async fn check_once(prober: &dyn Prober, target: &TargetSpec) -> CheckReport {
    match prober.probe(target).await {
        Ok(result) => {
            let mut fingerprint = Fingerprint::ZERO;
            let violations = evaluate(&target.rules, &result, &mut fingerprint);
            CheckReport {
                path: target.path.clone(),
                status_code: Some(result.status_code),
                elapsed_ms: Some(result.elapsed.as_millis()),
                fingerprint: Some(fingerprint.to_string()),
                violations: violations.messages().to_vec(),
                error: None,
            }
        }
        Err(e) => CheckReport {
            path: target.path.clone(),
            status_code: None,
            elapsed_ms: None,
            fingerprint: None,
            violations: Vec::new(),
            error: Some(e.reason()),
        },
    }
}

fn print_text_reports(reports: &[CheckReport]) {
    for report in reports {
        let status_icon = if report.passed() { "✓" } else { "✗" };
        match (&report.error, report.status_code, report.elapsed_ms) {
            (Some(error), _, _) => println!("{} {} - {}", status_icon, report.path, error),
            (None, Some(code), Some(elapsed)) => {
                println!("{} {} - {} - {}ms", status_icon, report.path, code, elapsed)
            }
            _ => println!("{} {}", status_icon, report.path),
        }

        for violation in &report.violations {
            println!("  - {violation}");
        }
    }
}

/// 测试通知命令
pub struct TestNotificationCommand;

#[async_trait]
impl Command for TestNotificationCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::TestNotification { to } = &args.command {
            self.test_notification(args, to).await
        } else {
            Ok(())
        }
    }
}

impl TestNotificationCommand {
    async fn test_notification(&self, args: &Args, to: &[String]) -> Result<()> {
        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(args.get_config_path()).await?;

        let Some(email) = config.global.email.as_ref() else {
            println!("❌ 未配置邮件服务器");
            println!("请在配置文件中设置 [global.email]");
            return Err(ConfigError::ValidationError("缺少 global.email 配置".to_string()).into());
        };

        println!("🔗 邮件服务器: {}:{}", email.host, email.port);
        let sender = build_sender(Some(email))?;

        println!("📡 测试SMTP连接...");
        sender
            .test_connection()
            .await
            .map_err(|e| NotificationError::SendError(format!("{e:#}")))?;
        println!("✅ SMTP连接正常");

        if to.is_empty() {
            println!("未指定 --to，跳过测试邮件发送");
            return Ok(());
        }

        println!("📤 发送测试邮件...");
        match sender.send_test(to).await {
            Ok(()) => {
                println!("✅ 测试邮件发送成功！");
                Ok(())
            }
            Err(e) => {
                println!("❌ 测试邮件发送失败: {e:#}");
                println!("请检查：");
                println!("  1. 用户名和密码是否正确");
                println!("  2. 端口和 ssl 设置是否匹配");
                println!("  3. 收件人地址是否有效");
                Err(NotificationError::SendError(format!("{e:#}")).into())
            }
        }
    }
}
