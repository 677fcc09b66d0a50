//! 任务调度器模块
//!
//! 单个调度任务独占注册表：选出到期目标，在并发上限内逐个派发检测任务，
//! 每次派发后按配置的间隔暂停，一轮结束后等待批次间隔。
//! 停止时不再派发新检测，并等待所有进行中的检测完成后才返回。

use crate::config::types::GlobalConfig;
use crate::error::ConfigError;
use crate::monitor::check::{run_check, CheckCompletion, CheckContext, CheckGuard, CheckOutcome};
use crate::monitor::probe::Prober;
use crate::monitor::registry::{CheckTicket, Registry};
use crate::monitor::target::TargetSpec;
use crate::notification::NotificationSender;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 最大并发检测数
    pub max_threads: usize,
    /// 每次派发后的间隔
    pub sleep_time_url: Duration,
    /// 每轮之间的间隔
    pub sleep_time_batch: Duration,
}

impl SchedulerConfig {
    pub fn new(
        max_threads: usize,
        sleep_time_url: Duration,
        sleep_time_batch: Duration,
    ) -> Result<Self, ConfigError> {
        if max_threads == 0 {
            return Err(ConfigError::ValidationError(
                "最大并发检测数(max_threads)不能为0".to_string(),
            ));
        }

        Ok(Self {
            max_threads,
            sleep_time_url,
            sleep_time_batch,
        })
    }

    pub fn from_global(global: &GlobalConfig) -> Result<Self, ConfigError> {
        Self::new(
            global.max_threads,
            global.sleep_time_url,
            global.sleep_time_batch,
        )
    }
}

/// 调度器状态
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 监控目标数量
    pub total_targets: usize,
    /// 检测中的数量
    pub in_flight: usize,
    /// 已派发的检测次数
    pub checks_dispatched: u64,
    pub checks_passed: u64,
    pub checks_violated: u64,
    /// 传输层失败次数
    pub probe_failures: u64,
    /// 未正常结束的检测次数
    pub checks_aborted: u64,
    /// 最后更新时间
    pub last_update: Instant,
    /// 通知统计
    pub notification_stats: NotificationStats,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            total_targets: 0,
            in_flight: 0,
            checks_dispatched: 0,
            checks_passed: 0,
            checks_violated: 0,
            probe_failures: 0,
            checks_aborted: 0,
            last_update: Instant::now(),
            notification_stats: NotificationStats::default(),
        }
    }
}

/// 通知统计信息
#[derive(Debug, Clone, Default)]
pub struct NotificationStats {
    /// 总通知发送次数
    pub total_sent: u64,
    /// 通知发送成功次数
    pub successful_sent: u64,
    /// 通知发送失败次数
    pub failed_sent: u64,
    /// 最后通知时间
    pub last_notification_time: Option<Instant>,
}

/// 任务调度器trait，定义调度接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器
    ///
    /// # 参数
    /// * `targets` - 编译后的监控目标
    async fn start(&self, targets: Vec<Arc<TargetSpec>>) -> Result<()>;

    /// 停止调度器，返回前等待所有进行中的检测完成
    async fn stop(&self) -> Result<()>;

    /// 替换监控目标集合
    ///
    /// # 参数
    /// * `targets` - 新的监控目标，必须已经通过验证和编译
    async fn reload_config(&self, targets: Vec<Arc<TargetSpec>>) -> Result<()>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

enum SchedulerCommand {
    Reload(Vec<Arc<TargetSpec>>),
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    handle: JoinHandle<()>,
}

/// 任务调度器实现
pub struct TaskScheduler {
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn NotificationSender>,
    config: SchedulerConfig,
    status: Arc<RwLock<SchedulerStatus>>,
    in_flight: Arc<AtomicUsize>,
    running: Mutex<Option<RunningLoop>>,
}

impl TaskScheduler {
    /// 创建新的任务调度器
    ///
    /// # 参数
    /// * `prober` - 探测器
    /// * `notifier` - 通知发送器
    /// * `config` - 调度参数
    pub fn new(
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn NotificationSender>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            prober,
            notifier,
            config,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }
}

#[async_trait]
impl Scheduler for TaskScheduler {
    async fn start(&self, targets: Vec<Arc<TargetSpec>>) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(anyhow::anyhow!("调度器已在运行"));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut registry = Registry::new();
        registry.load(targets);

        info!(
            "启动调度器，监控目标: {}，最大并发: {}",
            registry.len(),
            self.config.max_threads
        );

        {
            let mut status = self.status.write().await;
            status.is_running = true;
            status.total_targets = registry.len();
            status.last_update = Instant::now();
        }

        let scheduler_loop = SchedulerLoop {
            registry,
            config: self.config,
            semaphore: Arc::new(Semaphore::new(self.config.max_threads)),
            context: CheckContext {
                prober: Arc::clone(&self.prober),
                notifier: Arc::clone(&self.notifier),
                completions: completion_tx,
                in_flight: Arc::clone(&self.in_flight),
            },
            completions: completion_rx,
            commands: command_rx,
            stop: stop_rx,
            status: Arc::clone(&self.status),
        };

        *running = Some(RunningLoop {
            stop_tx,
            commands: command_tx,
            handle: tokio::spawn(scheduler_loop.run()),
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("调度器未运行");
            return Ok(());
        };

        info!("正在停止调度器...");
        // 调度任务已退出时发送会失败，此时只需等待句柄
        let _ = running.stop_tx.send(true);
        running.handle.await.context("调度任务异常退出")?;

        info!("调度器已停止");
        Ok(())
    }

    async fn reload_config(&self, targets: Vec<Arc<TargetSpec>>) -> Result<()> {
        let running = self.running.lock().await;
        let running = running
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("调度器未运行，无法重载配置"))?;

        running
            .commands
            .send(SchedulerCommand::Reload(targets))
            .map_err(|_| anyhow::anyhow!("调度任务已退出，无法重载配置"))?;
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        let mut status = self.status.read().await.clone();
        status.in_flight = self.in_flight.load(Ordering::SeqCst);
        status
    }
}

/// 调度循环，独占注册表
struct SchedulerLoop {
    registry: Registry,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    context: CheckContext,
    completions: mpsc::UnboundedReceiver<CheckCompletion>,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    stop: watch::Receiver<bool>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SchedulerLoop {
    async fn run(mut self) {
        'batch: loop {
            self.apply_pending().await;

            let due = self.registry.select_due(Instant::now());
            if !due.is_empty() {
                debug!("本轮到期目标: {}", due.len());
            }

            for spec in due {
                if self.stop_requested() {
                    break 'batch;
                }

                // 达到并发上限时在此等待
                let permit = tokio::select! {
                    biased;
                    _ = wait_for_stop(&mut self.stop) => break 'batch,
                    permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'batch,
                    },
                };

                self.apply_completions().await;
                let Some(ticket) = self.registry.begin_check(&spec.path, Instant::now()) else {
                    continue;
                };
                self.dispatch(ticket, permit).await;

                if sleep_or_stop(&mut self.stop, self.config.sleep_time_url).await {
                    break 'batch;
                }
            }

            if sleep_or_stop(&mut self.stop, self.config.sleep_time_batch).await {
                break;
            }
        }

        self.drain().await;
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    async fn dispatch(&mut self, ticket: CheckTicket, permit: OwnedSemaphorePermit) {
        let guard = CheckGuard::new(ticket.spec.path.clone(), &self.context, permit);
        debug!(url = %ticket.spec.path, check_id = %ticket.id, "派发检测");

        tokio::spawn(run_check(ticket, self.context.clone(), guard));

        let mut status = self.status.write().await;
        status.checks_dispatched += 1;
        status.last_update = Instant::now();
    }

    async fn apply_pending(&mut self) {
        self.apply_completions().await;

        while let Ok(command) = self.commands.try_recv() {
            match command {
                SchedulerCommand::Reload(targets) => self.apply_reload(targets).await,
            }
        }
    }

    async fn apply_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            self.apply_completion(completion).await;
        }
    }

    async fn apply_completion(&mut self, completion: CheckCompletion) {
        self.registry
            .complete(&completion.path, completion.fingerprint);

        let mut status = self.status.write().await;
        status.last_update = Instant::now();
        match completion.outcome {
            CheckOutcome::Passed => status.checks_passed += 1,
            CheckOutcome::Violated { notified } => {
                status.checks_violated += 1;
                update_notification_stats(&mut status, notified);
            }
            CheckOutcome::ProbeFailed => status.probe_failures += 1,
            CheckOutcome::Aborted => {
                error!(url = %completion.path, "检测任务异常退出");
                status.checks_aborted += 1;
            }
        }
    }

    async fn apply_reload(&mut self, targets: Vec<Arc<TargetSpec>>) {
        let previous = self.registry.len();
        self.registry.load(targets);
        info!(
            "监控目标已更新: {} -> {}，检测中: {}",
            previous,
            self.registry.len(),
            self.registry.in_flight_count()
        );

        let mut status = self.status.write().await;
        status.total_targets = self.registry.len();
        status.last_update = Instant::now();
    }

    /// 等待所有进行中的检测完成
    async fn drain(&mut self) {
        let pending = self.registry.in_flight_count();
        if pending > 0 {
            info!("等待 {} 个进行中的检测完成", pending);
        }

        while self.registry.in_flight_count() > 0 {
            match self.completions.recv().await {
                Some(completion) => self.apply_completion(completion).await,
                None => {
                    warn!("完成通道已关闭，剩余检测: {}", self.registry.in_flight_count());
                    break;
                }
            }
        }

        let mut status = self.status.write().await;
        status.is_running = false;
        status.last_update = Instant::now();
    }
}

fn update_notification_stats(status: &mut SchedulerStatus, success: bool) {
    let stats = &mut status.notification_stats;
    stats.total_sent += 1;
    if success {
        stats.successful_sent += 1;
    } else {
        stats.failed_sent += 1;
    }
    stats.last_notification_time = Some(Instant::now());
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    // 发送端被丢弃同样视为停止
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// 等待指定时长，期间收到停止信号时返回 `true`
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_stop(stop) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_threads_rejected() {
        let result = SchedulerConfig::new(0, Duration::ZERO, Duration::ZERO);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_from_global() {
        let global = GlobalConfig {
            max_threads: 4,
            ..GlobalConfig::default()
        };
        let config = SchedulerConfig::from_global(&global).unwrap();
        assert_eq!(config.max_threads, 4);
        assert_eq!(config.sleep_time_batch, global.sleep_time_batch);
    }

    #[test]
    fn test_notification_stats_update() {
        let mut status = SchedulerStatus::default();
        update_notification_stats(&mut status, true);
        update_notification_stats(&mut status, false);

        assert_eq!(status.notification_stats.total_sent, 2);
        assert_eq!(status.notification_stats.successful_sent, 1);
        assert_eq!(status.notification_stats.failed_sent, 1);
        assert!(status.notification_stats.last_notification_time.is_some());
    }
}
