//! 信号处理模块
//!
//! 把进程信号转换为控制事件：SIGINT/SIGTERM 触发优雅关闭，SIGHUP 触发配置重载。
//! 优雅关闭期间再次收到关闭信号时升级为强制退出。

use crate::error::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 控制事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// 停止调度并等待进行中的检测完成
    Shutdown,
    /// 从磁盘重新加载配置
    Reload,
    /// 关闭过程中再次收到关闭信号，不再等待进行中的检测
    ForceShutdown,
}

/// 设置信号处理器
///
/// # 参数
/// * `control_tx` - 控制事件发送端
pub fn setup_signal_handlers(control_tx: broadcast::Sender<ControlEvent>) -> Result<()> {
    #[cfg(unix)]
    {
        setup_unix_signals(control_tx)
    }
    #[cfg(not(unix))]
    {
        setup_ctrl_c(control_tx);
        Ok(())
    }
}

/// 将信号映射为控制事件，第二次及之后的关闭信号映射为强制退出
#[cfg(unix)]
fn classify_signal(signal: i32, shutdown_requested: &mut bool) -> Option<ControlEvent> {
    match signal {
        SIGINT | SIGTERM if *shutdown_requested => {
            warn!("再次接收到关闭信号 ({signal})，强制退出");
            Some(ControlEvent::ForceShutdown)
        }
        SIGINT | SIGTERM => {
            info!("接收到关闭信号 ({signal})，开始优雅关闭...");
            *shutdown_requested = true;
            Some(ControlEvent::Shutdown)
        }
        SIGHUP => {
            info!("接收到 SIGHUP 信号，重新加载配置...");
            Some(ControlEvent::Reload)
        }
        _ => {
            warn!("接收到未处理的信号: {signal}");
            None
        }
    }
}

#[cfg(unix)]
fn setup_unix_signals(control_tx: broadcast::Sender<ControlEvent>) -> Result<()> {
    use futures::stream::StreamExt;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    tokio::spawn(async move {
        let mut shutdown_requested = false;
        while let Some(signal) = signals.next().await {
            let Some(event) = classify_signal(signal, &mut shutdown_requested) else {
                continue;
            };

            if let Err(e) = control_tx.send(event) {
                error!("发送控制事件失败: {e}");
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_ctrl_c(control_tx: broadcast::Sender<ControlEvent>) {
    tokio::spawn(async move {
        let mut event = ControlEvent::Shutdown;
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("监听 Ctrl+C 失败: {e}");
                break;
            }
            info!("接收到 Ctrl+C: {:?}", event);
            if let Err(e) = control_tx.send(event) {
                error!("发送控制事件失败: {e}");
            }
            event = ControlEvent::ForceShutdown;
        }
    });
}
