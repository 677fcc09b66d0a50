//! 配置文件监控模块
//!
//! 监听配置文件变更，重新加载并验证后通过广播通道发布新配置。
//! 加载或验证失败时只记录日志，当前运行的配置保持不变。

use crate::config::loader::{ConfigLoader, TomlConfigLoader};
use crate::config::types::Config;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// 配置变更事件
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// 已通过验证的新配置
    pub new_config: Config,
    /// 变更时间
    pub timestamp: Instant,
    /// 配置版本号
    pub version: u64,
}

/// 配置文件监控器
pub struct ConfigWatcher {
    config_path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    loader: TomlConfigLoader,
    event_sender: broadcast::Sender<ConfigChangeEvent>,
    /// 防抖动延迟，编辑器保存时通常会连续触发多个事件
    debounce_delay: Duration,
}

impl ConfigWatcher {
    /// 创建新的配置监控器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `debounce_delay` - 防抖动延迟时间
    ///
    /// # 返回
    /// * `Result<(Self, broadcast::Receiver<ConfigChangeEvent>)>` - 监控器和事件接收器
    pub fn new<P: AsRef<Path>>(
        config_path: P,
        debounce_delay: Duration,
    ) -> Result<(Self, broadcast::Receiver<ConfigChangeEvent>)> {
        let config_path = config_path.as_ref().to_path_buf();
        Self::validate_config_path(&config_path)?;

        let (event_sender, event_receiver) = broadcast::channel(16);

        let watcher = Self {
            config_path,
            watcher: None,
            loader: TomlConfigLoader::new(true),
            event_sender,
            debounce_delay,
        };

        Ok((watcher, event_receiver))
    }

    fn validate_config_path(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(anyhow::anyhow!("配置文件不存在或不是文件: {}", path.display()));
        }

        if path.extension().map_or(true, |ext| ext != "toml") {
            warn!("配置文件扩展名不是.toml: {}", path.display());
        }

        Ok(())
    }

    /// 启动配置文件监控
    pub fn start(&mut self) -> Result<()> {
        info!("启动配置文件监控: {}", self.config_path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // 接收端关闭说明监控任务已结束
                let _ = tx.send(res);
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("创建文件监控器失败")?;

        // 监控所在目录，编辑器常以"写临时文件再重命名"的方式保存
        let watch_path = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", watch_path.display()))?;

        self.watcher = Some(watcher);

        tokio::spawn(Self::handle_file_events(
            rx,
            self.config_path.clone(),
            self.event_sender.clone(),
            self.loader.clone(),
            self.debounce_delay,
        ));

        Ok(())
    }

    async fn handle_file_events(
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        config_path: PathBuf,
        event_sender: broadcast::Sender<ConfigChangeEvent>,
        loader: TomlConfigLoader,
        debounce_delay: Duration,
    ) {
        let file_name = config_path.file_name().map(|name| name.to_os_string());
        let mut version = 1u64;

        while let Some(res) = rx.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                    continue;
                }
            };

            if !Self::is_target_file_event(&event, file_name.as_deref()) {
                continue;
            }
            debug!("检测到配置文件变更事件: {:?}", event.kind);

            // 等待写入完成，并合并这段时间内的后续事件
            tokio::time::sleep(debounce_delay).await;
            while rx.try_recv().is_ok() {}

            match loader.load_from_file(&config_path).await {
                Ok(new_config) => {
                    info!("配置文件已重新加载，版本: {}", version);
                    let change = ConfigChangeEvent {
                        config_path: config_path.clone(),
                        new_config,
                        timestamp: Instant::now(),
                        version,
                    };
                    version += 1;

                    if event_sender.send(change).is_err() {
                        debug!("没有配置变更订阅者，停止监控任务");
                        break;
                    }
                }
                Err(e) => {
                    error!("配置重载失败，继续使用当前配置: {}", e);
                }
            }
        }
    }

    /// 按文件名匹配，避免相对路径与事件中的绝对路径比较失败
    fn is_target_file_event(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
        let Some(file_name) = file_name else {
            return false;
        };

        match event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(file_name)),
            _ => false,
        }
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("配置文件监控已停止");
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::ffi::OsStr;
    use std::fs;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_config_watcher_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[global]\n").unwrap();

        let result = ConfigWatcher::new(temp_file.path(), Duration::from_millis(100));
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_config_file_is_rejected() {
        let result = ConfigWatcher::validate_config_path(Path::new("/nonexistent/file.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_target_file_event_filter() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/url-vitals/config.toml"));
        let create_other = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/url-vitals/other.toml"));
        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/etc/url-vitals/config.toml"));

        let name = Some(OsStr::new("config.toml"));
        assert!(ConfigWatcher::is_target_file_event(&modify, name));
        assert!(!ConfigWatcher::is_target_file_event(&create_other, name));
        assert!(!ConfigWatcher::is_target_file_event(&remove, name));
    }
}
