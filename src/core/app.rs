//! 应用程序核心逻辑
//!
//! 包含主函数、命令执行和应用程序生命周期管理

use crate::cli::args::{Args, Commands};
use crate::cli::commands::{
    CheckCommand, Command, InitCommand, StartCommand, TestNotificationCommand, ValidateCommand,
    VersionCommand,
};
use crate::config::{ConfigLoader, TomlConfigLoader};
use crate::logging::{dependency_levels, parse_level, LogConfig, LoggingSystem};
use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use tracing::{error, info};

/// 应用程序主函数
pub async fn main() -> Result<()> {
    let args = Args::parse();

    let level = resolve_log_level(&args).await;
    let log_config = LogConfig {
        level,
        file_path: args.log_file.clone(),
        console: true,
        json_format: args.json_logs,
        module_levels: dependency_levels(level),
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("URL Vitals v{} 启动", crate::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 确定日志级别
///
/// 命令行参数优先，其次是配置文件中的 `log_level`，都不可用时使用 info
async fn resolve_log_level(args: &Args) -> LevelFilter {
    if let Some(level) = args.log_level {
        return level.into();
    }

    let loader = TomlConfigLoader::new(true);
    match loader.load_from_file(args.get_config_path()).await {
        Ok(config) => parse_level(&config.global.log_level).unwrap_or(LevelFilter::Info),
        Err(_) => LevelFilter::Info,
    }
}

/// 执行CLI命令
pub async fn execute_command(args: &Args) -> Result<()> {
    let command: &dyn Command = match &args.command {
        Commands::Start { .. } => &StartCommand,
        Commands::Check { .. } => &CheckCommand,
        Commands::Init { .. } => &InitCommand,
        Commands::Validate { .. } => &ValidateCommand,
        Commands::TestNotification { .. } => &TestNotificationCommand,
        Commands::Version { .. } => &VersionCommand,
    };

    command.execute(args).await.map_err(anyhow::Error::from)
}
