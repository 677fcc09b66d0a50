//! 服务管理模块
//!
//! 负责加载配置、组装监控组件，以及前台运行时的信号、热重载和关闭流程

use crate::config::{self, Config, ConfigChangeEvent, ConfigLoader, ConfigWatcher, TomlConfigLoader};
use crate::core::signal_handler::{setup_signal_handlers, ControlEvent};
use crate::monitor::{
    compile_targets, HttpProber, Prober, Scheduler, SchedulerConfig, SchedulerStatus,
    TaskScheduler,
};
use crate::notification::{build_sender, NotificationSender};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// 配置文件变更的防抖时间
const CONFIG_DEBOUNCE: Duration = Duration::from_millis(500);

/// 监控服务
///
/// 持有当前生效的配置和调度器。重载只替换监控目标，
/// 全局设置（并发数、间隔、邮件）需要重启后生效。
pub struct MonitorService {
    config: RwLock<Config>,
    scheduler: Arc<TaskScheduler>,
}

impl MonitorService {
    /// 创建监控服务
    ///
    /// # 参数
    /// * `config` - 已验证的配置
    /// * `prober` - 探测器
    /// * `notifier` - 通知发送器
    pub fn new(
        config: Config,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        let scheduler_config =
            SchedulerConfig::from_global(&config.global).context("调度参数无效")?;
        let scheduler = Arc::new(TaskScheduler::new(prober, notifier, scheduler_config));

        Ok(Self {
            config: RwLock::new(config),
            scheduler,
        })
    }

    /// 使用HTTP探测器和配置中的邮件设置创建监控服务
    pub fn from_config(config: Config) -> Result<Self> {
        let prober: Arc<dyn Prober> = Arc::new(HttpProber::new()?);
        let notifier = build_sender(config.global.email.as_ref())?;
        if config.global.email.is_none() {
            warn!("未配置邮件服务器，告警只会写入日志");
        }
        Self::new(config, prober, notifier)
    }

    /// 编译目标并启动调度
    pub async fn start(&self) -> Result<()> {
        let targets = {
            let config = self.config.read().await;
            compile_targets(&config).context("编译监控目标失败")?
        };

        self.scheduler
            .start(targets)
            .await
            .context("启动调度器失败")
    }

    /// 应用新配置
    ///
    /// 新配置验证或编译失败时返回错误，当前目标集合保持不变
    pub async fn reload(&self, new_config: Config) -> Result<()> {
        config::validate_config(&new_config).map_err(|e| anyhow::anyhow!("配置验证失败: {}", e))?;
        let targets = compile_targets(&new_config).context("编译监控目标失败")?;
        let target_count = targets.len();

        self.scheduler.reload_config(targets).await?;

        let mut config = self.config.write().await;
        if config.global != new_config.global {
            warn!("全局配置的变更需要重启后生效，本次只更新监控目标");
        }
        config.urls = new_config.urls;

        info!("配置重载完成，启用的监控目标: {}", target_count);
        Ok(())
    }

    /// 停止调度，等待进行中的检测完成
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.stop().await
    }

    /// 调度器状态
    pub async fn status(&self) -> SchedulerStatus {
        self.scheduler.get_status().await
    }

    /// 当前生效的配置
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }
}

/// 服务启动器
pub struct ServiceLauncher;

impl ServiceLauncher {
    /// 加载和验证配置
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `max_threads` - 命令行覆盖的最大并发数
    pub async fn load_and_validate_config(
        config_path: &Path,
        max_threads: Option<usize>,
    ) -> Result<Config> {
        info!("加载配置文件: {:?}", config_path);

        let config_loader = TomlConfigLoader::new(true);
        let mut config = config_loader
            .load_from_file(config_path)
            .await
            .context("加载配置文件失败")?;

        if let Some(max_threads) = max_threads {
            config.global.max_threads = max_threads;
        }

        config::validate_config(&config).map_err(|e| anyhow::anyhow!("配置验证失败: {}", e))?;

        info!("配置加载成功，共 {} 个监控目标", config.urls.len());
        Ok(config)
    }

    /// 在前台运行监控，直到收到关闭信号
    ///
    /// SIGHUP 和配置文件变更都会触发重载；重载失败时继续使用当前配置
    pub async fn run_foreground(config_path: &Path, max_threads: Option<usize>) -> Result<()> {
        let config = Self::load_and_validate_config(config_path, max_threads).await?;
        let service = MonitorService::from_config(config)?;
        service.start().await?;

        let (control_tx, mut control_rx) = broadcast::channel(8);
        setup_signal_handlers(control_tx.clone()).context("设置信号处理器失败")?;

        let (_watcher, mut config_rx) = match Self::start_config_watcher(config_path) {
            Ok((watcher, rx)) => (Some(watcher), Some(rx)),
            Err(e) => {
                warn!("配置热重载不可用: {:#}", e);
                (None, None)
            }
        };

        info!("监控已启动，按 Ctrl+C 停止");

        loop {
            tokio::select! {
                event = control_rx.recv() => match event {
                    Ok(ControlEvent::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                    Ok(ControlEvent::ForceShutdown) => {
                        warn!("强制退出，不等待进行中的检测");
                        return Ok(());
                    }
                    Ok(ControlEvent::Reload) => {
                        Self::reload_from_file(&service, config_path).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("控制事件积压，跳过 {} 个", skipped);
                    }
                },
                change = next_config_change(&mut config_rx) => match change {
                    Ok(event) => {
                        info!("检测到配置文件变更 (版本 {})", event.version);
                        if let Err(e) = service.reload(event.new_config).await {
                            error!("应用新配置失败，继续使用当前配置: {:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("配置变更事件积压，跳过 {} 个", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("配置监控已停止");
                        config_rx = None;
                    }
                },
            }
        }

        info!("收到关闭信号，正在停止服务，再次发送关闭信号可强制退出...");
        tokio::select! {
            result = service.stop() => result?,
            _ = wait_for_force_shutdown(&mut control_rx) => {
                warn!("强制退出，放弃等待进行中的检测");
                return Ok(());
            }
        }
        info!("服务已停止");
        Ok(())
    }

    fn start_config_watcher(
        config_path: &Path,
    ) -> Result<(ConfigWatcher, broadcast::Receiver<ConfigChangeEvent>)> {
        let (mut watcher, rx) = ConfigWatcher::new(config_path, CONFIG_DEBOUNCE)?;
        watcher.start()?;
        Ok((watcher, rx))
    }

    async fn reload_from_file(service: &MonitorService, config_path: &Path) {
        let loader = TomlConfigLoader::new(true);
        let result = match loader.load_from_file(config_path).await {
            Ok(config) => service.reload(config).await,
            Err(e) => Err(anyhow::Error::from(e)),
        };

        if let Err(e) = result {
            error!("重新加载配置失败，继续使用当前配置: {:#}", e);
        }
    }
}

/// 等待强制退出事件，控制通道关闭后永远挂起
async fn wait_for_force_shutdown(rx: &mut broadcast::Receiver<ControlEvent>) {
    loop {
        match rx.recv().await {
            Ok(ControlEvent::ForceShutdown) => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// 等待下一个配置变更事件，未启用热重载时永远挂起
async fn next_config_change(
    rx: &mut Option<broadcast::Receiver<ConfigChangeEvent>>,
) -> std::result::Result<ConfigChangeEvent, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
