//! 监控模块
//!
//! 目标注册表、调度循环、HTTP探测与响应校验

pub mod check;
pub mod evaluator;
pub mod fingerprint;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod target;

// 重新导出主要类型
pub use check::{CheckCompletion, CheckOutcome};
pub use evaluator::{evaluate, Violations};
pub use fingerprint::Fingerprint;
pub use probe::{HttpProber, ProbeResult, Prober};
pub use registry::{CheckTicket, Registry, TargetState};
pub use scheduler::{
    NotificationStats, Scheduler, SchedulerConfig, SchedulerStatus, TaskScheduler,
};
pub use target::{compile_targets, parse_recipients, RequestBody, RuleSet, TargetSpec};
