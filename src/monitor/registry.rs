//! 目标注册表与到期索引
//!
//! 注册表只由调度任务访问。到期索引按 (上次检测时间, 路径) 排序，
//! 从未检测过的目标排在最前面；每次更新上次检测时间都会重新定位该目标。

use crate::monitor::fingerprint::Fingerprint;
use crate::monitor::target::TargetSpec;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

/// 目标的可变状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetState {
    pub last_checked: Option<Instant>,
    pub fingerprint: Fingerprint,
    pub in_flight: bool,
}

/// 交给检测任务的目标快照
#[derive(Debug, Clone)]
pub struct CheckTicket {
    pub id: Uuid,
    pub spec: Arc<TargetSpec>,
    /// 派发时保存的指纹
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DueKey {
    last_checked: Option<Instant>,
    path: String,
}

#[derive(Debug)]
struct Entry {
    spec: Arc<TargetSpec>,
    state: TargetState,
}

impl Entry {
    fn due_key(&self) -> DueKey {
        DueKey {
            last_checked: self.state.last_checked,
            path: self.spec.path.clone(),
        }
    }
}

/// 目标注册表
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
    due: BTreeSet<DueKey>,
    /// 重载时被移除但仍在检测中的目标
    draining: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换整个目标集合
    ///
    /// 路径保持不变的目标沿用原有的指纹、上次检测时间和检测中标记。
    /// 被移除但仍在检测中的目标会一直计入检测中数量，直到其检测完成。
    pub fn load(&mut self, targets: Vec<Arc<TargetSpec>>) {
        let mut previous = std::mem::take(&mut self.entries);
        self.due.clear();

        for spec in targets {
            let state = match previous.remove(&spec.path) {
                Some(entry) => entry.state,
                None if self.draining.remove(&spec.path) => TargetState {
                    in_flight: true,
                    ..TargetState::default()
                },
                None => TargetState::default(),
            };

            let entry = Entry { spec, state };
            self.due.insert(entry.due_key());
            self.entries.insert(entry.spec.path.clone(), entry);
        }

        for (path, entry) in previous {
            if entry.state.in_flight {
                self.draining.insert(path);
            }
        }
    }

    /// 按到期索引顺序返回所有到期且空闲的目标
    pub fn select_due(&self, now: Instant) -> Vec<Arc<TargetSpec>> {
        self.due
            .iter()
            .filter_map(|key| self.entries.get(&key.path))
            .filter(|entry| !entry.state.in_flight && Self::is_due(entry, now))
            .map(|entry| Arc::clone(&entry.spec))
            .collect()
    }

    fn is_due(entry: &Entry, now: Instant) -> bool {
        match entry.state.last_checked {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= entry.spec.frequency,
        }
    }

    pub fn mark_in_flight(&mut self, path: &str) -> bool {
        self.set_in_flight(path, true)
    }

    pub fn mark_idle(&mut self, path: &str) -> bool {
        self.set_in_flight(path, false)
    }

    fn set_in_flight(&mut self, path: &str, in_flight: bool) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.state.in_flight = in_flight;
                true
            }
            None => false,
        }
    }

    /// 更新上次检测时间并在到期索引中重新定位
    pub fn update_last_checked(&mut self, path: &str, now: Instant) -> bool {
        let Some(entry) = self.entries.get_mut(path) else {
            return false;
        };

        self.due.remove(&entry.due_key());
        entry.state.last_checked = Some(now);
        self.due.insert(entry.due_key());
        true
    }

    /// 标记检测中并更新上次检测时间，返回交给检测任务的快照
    ///
    /// 目标不存在或已在检测中时返回 `None`
    pub fn begin_check(&mut self, path: &str, now: Instant) -> Option<CheckTicket> {
        let entry = self.entries.get(path)?;
        if entry.state.in_flight {
            return None;
        }
        let ticket = CheckTicket {
            id: Uuid::new_v4(),
            spec: Arc::clone(&entry.spec),
            fingerprint: entry.state.fingerprint,
        };

        self.mark_in_flight(path);
        self.update_last_checked(path, now);
        Some(ticket)
    }

    /// 应用检测结果：保存新指纹（探测成功时）并标记空闲
    pub fn complete(&mut self, path: &str, fingerprint: Option<Fingerprint>) {
        match self.entries.get_mut(path) {
            Some(entry) => {
                if let Some(fingerprint) = fingerprint {
                    entry.state.fingerprint = fingerprint;
                }
                entry.state.in_flight = false;
            }
            None => {
                self.draining.remove(path);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.entries.values().filter(|e| e.state.in_flight).count() + self.draining.len()
    }

    pub fn is_in_flight(&self, path: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.state.in_flight)
            || self.draining.contains(path)
    }

    pub fn last_checked(&self, path: &str) -> Option<Instant> {
        self.entries.get(path).and_then(|e| e.state.last_checked)
    }

    pub fn fingerprint(&self, path: &str) -> Option<Fingerprint> {
        self.entries.get(path).map(|e| e.state.fingerprint)
    }

    pub fn state(&self, path: &str) -> Option<&TargetState> {
        self.entries.get(path).map(|e| &e.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::UrlConfig;
    use std::time::Duration;

    fn target(path: &str, frequency: Duration) -> Arc<TargetSpec> {
        let mut config = UrlConfig::new(path);
        config.frequency = frequency;
        Arc::new(TargetSpec::try_from(&config).unwrap())
    }

    fn paths(targets: &[Arc<TargetSpec>]) -> Vec<&str> {
        targets.iter().map(|t| t.path.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_checked_targets_are_due_in_path_order() {
        let mut registry = Registry::new();
        registry.load(vec![
            target("https://b.example.com", Duration::from_secs(60)),
            target("https://a.example.com", Duration::from_secs(60)),
        ]);

        let due = registry.select_due(Instant::now());
        assert_eq!(
            paths(&due),
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_order_follows_last_checked() {
        let mut registry = Registry::new();
        registry.load(vec![
            target("https://a.example.com", Duration::ZERO),
            target("https://b.example.com", Duration::ZERO),
            target("https://c.example.com", Duration::ZERO),
        ]);

        let start = Instant::now();
        registry.update_last_checked("https://a.example.com", start);
        tokio::time::advance(Duration::from_secs(1)).await;
        registry.update_last_checked("https://b.example.com", Instant::now());

        let due = registry.select_due(Instant::now());
        assert_eq!(
            paths(&due),
            vec![
                "https://c.example.com",
                "https://a.example.com",
                "https://b.example.com"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequency_gates_selection() {
        let mut registry = Registry::new();
        registry.load(vec![target("https://a.example.com", Duration::from_secs(30))]);

        let ticket = registry
            .begin_check("https://a.example.com", Instant::now())
            .unwrap();
        registry.complete(&ticket.spec.path, None);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(registry.select_due(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.select_due(Instant::now()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_target_is_never_reselected() {
        let mut registry = Registry::new();
        registry.load(vec![target("https://a.example.com", Duration::ZERO)]);

        assert!(registry
            .begin_check("https://a.example.com", Instant::now())
            .is_some());
        tokio::time::advance(Duration::from_secs(3600)).await;

        assert!(registry.select_due(Instant::now()).is_empty());
        assert!(registry
            .begin_check("https://a.example.com", Instant::now())
            .is_none());
        assert_eq!(registry.in_flight_count(), 1);

        registry.complete("https://a.example.com", None);
        assert_eq!(registry.in_flight_count(), 0);
        assert_eq!(registry.select_due(Instant::now()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_stores_fingerprint_only_on_success() {
        let mut registry = Registry::new();
        registry.load(vec![target("https://a.example.com", Duration::ZERO)]);

        registry.begin_check("https://a.example.com", Instant::now());
        registry.complete("https://a.example.com", Some(Fingerprint::new(1, 2)));
        assert_eq!(
            registry.fingerprint("https://a.example.com"),
            Some(Fingerprint::new(1, 2))
        );

        let ticket = registry
            .begin_check("https://a.example.com", Instant::now())
            .unwrap();
        assert_eq!(ticket.fingerprint, Fingerprint::new(1, 2));
        registry.complete("https://a.example.com", None);
        assert_eq!(
            registry.fingerprint("https://a.example.com"),
            Some(Fingerprint::new(1, 2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_preserves_history_for_surviving_paths() {
        let mut registry = Registry::new();
        registry.load(vec![
            target("https://a.example.com", Duration::from_secs(60)),
            target("https://b.example.com", Duration::from_secs(60)),
        ]);

        let now = Instant::now();
        registry.begin_check("https://a.example.com", now);
        registry.complete("https://a.example.com", Some(Fingerprint::new(7, 7)));
        registry.begin_check("https://b.example.com", now);

        registry.load(vec![
            target("https://a.example.com", Duration::from_secs(120)),
            target("https://b.example.com", Duration::from_secs(60)),
            target("https://c.example.com", Duration::from_secs(60)),
        ]);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.last_checked("https://a.example.com"), Some(now));
        assert_eq!(
            registry.fingerprint("https://a.example.com"),
            Some(Fingerprint::new(7, 7))
        );
        assert!(registry.is_in_flight("https://b.example.com"));
        assert_eq!(
            paths(&registry.select_due(Instant::now())),
            vec!["https://c.example.com"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_in_flight_target_drains() {
        let mut registry = Registry::new();
        registry.load(vec![target("https://a.example.com", Duration::ZERO)]);
        registry.begin_check("https://a.example.com", Instant::now());

        registry.load(vec![]);
        assert!(registry.is_empty());
        assert_eq!(registry.in_flight_count(), 1);

        registry.complete("https://a.example.com", Some(Fingerprint::new(1, 1)));
        assert_eq!(registry.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readded_draining_path_is_not_double_dispatched() {
        let mut registry = Registry::new();
        registry.load(vec![target("https://a.example.com", Duration::ZERO)]);
        registry.begin_check("https://a.example.com", Instant::now());

        registry.load(vec![]);
        registry.load(vec![target("https://a.example.com", Duration::ZERO)]);

        assert!(registry.select_due(Instant::now()).is_empty());
        assert_eq!(registry.in_flight_count(), 1);

        registry.complete("https://a.example.com", None);
        assert_eq!(registry.in_flight_count(), 0);
        assert_eq!(registry.select_due(Instant::now()).len(), 1);
    }
}
