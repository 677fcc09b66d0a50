//! 调度器集成测试
//!
//! 使用假的探测器和通知发送器验证并发上限、单目标互斥、停止时的排空以及重载。
//! 部分用例让每次探测耗时不同，使完成顺序交错

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url_vitals::config::UrlConfig;
use url_vitals::error::ProbeError;
use url_vitals::monitor::{
    ProbeResult, Prober, Scheduler, SchedulerConfig, TargetSpec, TaskScheduler, Violations,
};
use url_vitals::notification::NotificationSender;

/// 记录并发情况的假探测器
#[derive(Default)]
struct FakeProber {
    delay: Duration,
    /// 为真时每次探测的耗时随路径和调用次数变化
    varied: bool,
    status_code: u16,
    fail: bool,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_seen: AtomicUsize,
    per_path: Mutex<HashMap<String, usize>>,
    per_path_max: AtomicUsize,
    probes: Mutex<Vec<(String, Instant)>>,
}

impl FakeProber {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            status_code: 200,
            ..Self::default()
        }
    }

    fn delay_for(&self, path: &str) -> Duration {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.varied {
            return self.delay;
        }
        let seed = path.bytes().map(usize::from).sum::<usize>();
        Duration::from_millis(1 + ((call * 37 + seed * 13) % 120) as u64)
    }

    fn probe_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    fn probed_since(&self, since: Instant) -> Vec<String> {
        self.probes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, at)| *at >= since)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, target: &TargetSpec) -> Result<ProbeResult, ProbeError> {
        let delay = self.delay_for(&target.path);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        {
            let mut per_path = self.per_path.lock().unwrap();
            let count = per_path.entry(target.path.clone()).or_insert(0);
            *count += 1;
            self.per_path_max.fetch_max(*count, Ordering::SeqCst);
        }
        self.probes
            .lock()
            .unwrap()
            .push((target.path.clone(), Instant::now()));

        tokio::time::sleep(delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.per_path.lock().unwrap().get_mut(&target.path) {
            *count -= 1;
        }

        if self.fail {
            return Err(ProbeError::ClientBuild("connection refused".to_string()));
        }
        Ok(ProbeResult::from_parts(
            self.status_code,
            vec!["content-type:text/plain".to_string()],
            b"Service OK",
            delay,
        ))
    }
}

/// 记录告警的通知发送器，`fail` 为真时每次发送都失败
#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    alerts: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingNotifier {
    fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send_alert(
        &self,
        target: &TargetSpec,
        _result: &ProbeResult,
        violations: &Violations,
    ) -> anyhow::Result<()> {
        self.alerts
            .lock()
            .unwrap()
            .push((target.path.clone(), violations.messages().to_vec()));
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        Ok(())
    }

    async fn send_test(&self, _recipients: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn target(path: &str, frequency: Duration, status_regex: Option<&str>) -> Arc<TargetSpec> {
    let mut config = UrlConfig::new(path);
    config.frequency = frequency;
    config.status_code_regex = status_regex.map(str::to_string);
    Arc::new(TargetSpec::try_from(&config).unwrap())
}

fn targets(count: usize, frequency: Duration) -> Vec<Arc<TargetSpec>> {
    (0..count)
        .map(|i| target(&format!("https://host{i}.example.com"), frequency, None))
        .collect()
}

fn scheduler(
    prober: Arc<FakeProber>,
    notifier: Arc<RecordingNotifier>,
    max_threads: usize,
) -> TaskScheduler {
    let config =
        SchedulerConfig::new(max_threads, Duration::ZERO, Duration::from_millis(10)).unwrap();
    TaskScheduler::new(prober, notifier, config)
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_max_threads() {
    let prober = Arc::new(FakeProber::new(Duration::from_millis(50)));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier, 3);

    scheduler.start(targets(20, Duration::ZERO)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    scheduler.stop().await.unwrap();

    assert_eq!(prober.max_seen.load(Ordering::SeqCst), 3);
    assert!(prober.probe_count() > 20);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_holds_with_uneven_probe_times() {
    let prober = Arc::new(FakeProber {
        varied: true,
        ..FakeProber::new(Duration::ZERO)
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier, 3);

    let frequencies = [
        Duration::ZERO,
        Duration::from_millis(30),
        Duration::from_millis(250),
        Duration::from_secs(1),
    ];
    let mixed = (0..16)
        .map(|i| {
            target(
                &format!("https://mixed{i}.example.com/status"),
                frequencies[i % frequencies.len()],
                None,
            )
        })
        .collect();

    scheduler.start(mixed).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    scheduler.stop().await.unwrap();

    assert!(prober.max_seen.load(Ordering::SeqCst) <= 3);
    assert_eq!(prober.per_path_max.load(Ordering::SeqCst), 1);
    assert_eq!(prober.current.load(Ordering::SeqCst), 0);
    assert!(prober.probe_count() > 100);
    assert_eq!(scheduler.get_status().await.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_target_never_overlaps() {
    let prober = Arc::new(FakeProber::new(Duration::from_millis(200)));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier, 5);

    scheduler.start(targets(1, Duration::ZERO)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    scheduler.stop().await.unwrap();

    assert_eq!(prober.per_path_max.load(Ordering::SeqCst), 1);
    assert!(prober.probe_count() > 5);
}

#[tokio::test(start_paused = true)]
async fn test_frequency_limits_rechecks() {
    let prober = Arc::new(FakeProber::new(Duration::from_millis(10)));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier, 2);

    scheduler
        .start(targets(1, Duration::from_secs(60)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(150)).await;
    scheduler.stop().await.unwrap();

    // 0s、60s、120s 各一次
    assert_eq!(prober.probe_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_drains_in_flight_checks() {
    let prober = Arc::new(FakeProber::new(Duration::from_secs(5)));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier, 4);

    scheduler.start(targets(4, Duration::ZERO)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(scheduler.get_status().await.in_flight > 0);

    scheduler.stop().await.unwrap();

    let status = scheduler.get_status().await;
    assert!(!status.is_running);
    assert_eq!(status.in_flight, 0);
    assert_eq!(prober.current.load(Ordering::SeqCst), 0);
    assert_eq!(
        status.checks_passed,
        status.checks_dispatched,
        "every dispatched check should complete before stop returns"
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_never_alerts() {
    let prober = Arc::new(FakeProber {
        fail: true,
        ..FakeProber::new(Duration::from_millis(10))
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier.clone(), 2);

    scheduler
        .start(vec![target(
            "https://down.example.com",
            Duration::ZERO,
            Some("^200$"),
        )])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop().await.unwrap();

    let status = scheduler.get_status().await;
    assert!(status.probe_failures > 0);
    assert_eq!(status.checks_violated, 0);
    assert_eq!(notifier.alert_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_notifier_failure_does_not_stop_checks() {
    let prober = Arc::new(FakeProber {
        status_code: 500,
        ..FakeProber::new(Duration::from_millis(10))
    });
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let scheduler = scheduler(prober.clone(), notifier.clone(), 2);
    let started = Instant::now();

    scheduler
        .start(vec![
            target("https://a.example.com", Duration::ZERO, Some("^200$")),
            target("https://b.example.com", Duration::ZERO, Some("^200$")),
        ])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop().await.unwrap();

    let probed = prober.probed_since(started);
    assert!(probed.iter().filter(|p| p.as_str() == "https://a.example.com").count() > 1);
    assert!(probed.iter().filter(|p| p.as_str() == "https://b.example.com").count() > 1);

    let status = scheduler.get_status().await;
    assert!(status.checks_violated > 2);
    assert_eq!(status.notification_stats.successful_sent, 0);
    assert_eq!(
        status.notification_stats.failed_sent,
        status.checks_violated
    );

    let alerts = notifier.alerts.lock().unwrap();
    assert_eq!(
        alerts[0].1,
        vec!["Failed to match status code regex, got 500".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reload_replaces_target_set() {
    let prober = Arc::new(FakeProber::new(Duration::from_millis(10)));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober.clone(), notifier, 2);

    scheduler
        .start(vec![target("https://old.example.com", Duration::ZERO, None)])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    scheduler
        .reload_config(vec![target("https://new.example.com", Duration::ZERO, None)])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let settled = Instant::now();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop().await.unwrap();

    let probed = prober.probed_since(settled);
    assert!(!probed.is_empty());
    assert!(probed.iter().all(|p| p == "https://new.example.com"));
    assert_eq!(scheduler.get_status().await.total_targets, 1);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let prober = Arc::new(FakeProber::new(Duration::from_millis(1)));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(prober, notifier, 1);

    scheduler.start(Vec::new()).await.unwrap();
    assert!(scheduler.start(Vec::new()).await.is_err());
    scheduler.stop().await.unwrap();

    // 停止后可以再次停止
    scheduler.stop().await.unwrap();
}
