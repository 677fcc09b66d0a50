//! 单次检测任务
//!
//! 检测任务只持有派发时的目标快照：探测、校验，必要时发送告警，
//! 最后通过完成通道把新指纹交回调度任务。`CheckGuard` 在任何退出路径
//! （包括 panic 和任务被取消）上都会上报完成、递减计数并释放并发许可。

use crate::monitor::evaluator::evaluate;
use crate::monitor::fingerprint::Fingerprint;
use crate::monitor::probe::Prober;
use crate::monitor::registry::CheckTicket;
use crate::notification::NotificationSender;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

/// 单次检测的结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// 所有规则通过
    Passed,
    /// 存在违规，`notified` 表示告警是否发送成功
    Violated { notified: bool },
    /// 传输层失败，未触发告警
    ProbeFailed,
    /// 任务在完成前退出
    Aborted,
}

/// 检测完成消息
#[derive(Debug, Clone)]
pub struct CheckCompletion {
    pub path: String,
    /// 探测成功时本次观测到的指纹
    pub fingerprint: Option<Fingerprint>,
    pub outcome: CheckOutcome,
}

/// 检测任务共享的依赖
#[derive(Clone)]
pub struct CheckContext {
    pub prober: Arc<dyn Prober>,
    pub notifier: Arc<dyn NotificationSender>,
    pub completions: mpsc::UnboundedSender<CheckCompletion>,
    /// 当前检测中的数量
    pub in_flight: Arc<AtomicUsize>,
}

/// 完成守卫
///
/// 创建时计数加一，drop 时先递减计数再发送完成消息，最后释放许可。
pub struct CheckGuard {
    path: String,
    fingerprint: Option<Fingerprint>,
    outcome: CheckOutcome,
    completions: mpsc::UnboundedSender<CheckCompletion>,
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl CheckGuard {
    pub fn new(path: String, context: &CheckContext, permit: OwnedSemaphorePermit) -> Self {
        context.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            path,
            fingerprint: None,
            outcome: CheckOutcome::Aborted,
            completions: context.completions.clone(),
            in_flight: Arc::clone(&context.in_flight),
            _permit: permit,
        }
    }

    fn finish(&mut self, fingerprint: Option<Fingerprint>, outcome: CheckOutcome) {
        self.fingerprint = fingerprint;
        self.outcome = outcome;
    }
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let completion = CheckCompletion {
            path: std::mem::take(&mut self.path),
            fingerprint: self.fingerprint,
            outcome: self.outcome,
        };
        if self.completions.send(completion).is_err() {
            debug!("调度器已退出，丢弃检测完成消息");
        }
    }
}

/// 执行一次检测
///
/// # 参数
/// * `ticket` - 派发时的目标快照
/// * `context` - 检测依赖
/// * `guard` - 完成守卫，由调度任务在派发前创建
pub async fn run_check(ticket: CheckTicket, context: CheckContext, mut guard: CheckGuard) {
    let spec = ticket.spec;

    let result = match context.prober.probe(&spec).await {
        Ok(result) => result,
        Err(e) => {
            warn!(url = %spec.path, check_id = %ticket.id, "探测失败: {}", e.reason());
            guard.finish(None, CheckOutcome::ProbeFailed);
            return;
        }
    };

    let mut fingerprint = ticket.fingerprint;
    let violations = evaluate(&spec.rules, &result, &mut fingerprint);

    if violations.is_empty() {
        debug!(
            url = %spec.path,
            status = result.status_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "检测通过"
        );
        guard.finish(Some(fingerprint), CheckOutcome::Passed);
        return;
    }

    info!(
        url = %spec.path,
        status = result.status_code,
        elapsed_ms = result.elapsed.as_millis() as u64,
        violations = violations.len(),
        "检测发现违规"
    );

    let notified = match context
        .notifier
        .send_alert(&spec, &result, &violations)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            error!(url = %spec.path, "发送告警失败: {:#}", e);
            false
        }
    };

    guard.finish(Some(fingerprint), CheckOutcome::Violated { notified });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::UrlConfig;
    use crate::monitor::target::TargetSpec;
    use crate::notification::NoOpSender;
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    fn context(
        prober: Arc<dyn Prober>,
    ) -> (CheckContext, mpsc::UnboundedReceiver<CheckCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = CheckContext {
            prober,
            notifier: Arc::new(NoOpSender),
            completions: tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        };
        (context, rx)
    }

    struct PanickingProber;

    #[async_trait::async_trait]
    impl Prober for PanickingProber {
        async fn probe(
            &self,
            _target: &TargetSpec,
        ) -> Result<crate::monitor::probe::ProbeResult, crate::error::ProbeError> {
            panic!("probe panicked");
        }
    }

    #[tokio::test]
    async fn test_guard_reports_on_panic() {
        let (context, mut rx) = context(Arc::new(PanickingProber));
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.clone().acquire_owned().await.unwrap();

        let spec = Arc::new(TargetSpec::try_from(&UrlConfig::new("https://example.com")).unwrap());
        let ticket = CheckTicket {
            id: Uuid::new_v4(),
            spec,
            fingerprint: Fingerprint::ZERO,
        };
        let guard = CheckGuard::new(ticket.spec.path.clone(), &context, permit);
        assert_eq!(context.in_flight.load(Ordering::SeqCst), 1);

        let handle = tokio::spawn(run_check(ticket, context.clone(), guard));
        assert!(handle.await.is_err());

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.path, "https://example.com");
        assert_eq!(completion.outcome, CheckOutcome::Aborted);
        assert_eq!(completion.fingerprint, None);
        assert_eq!(context.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(semaphore.available_permits(), 1);
    }
}
