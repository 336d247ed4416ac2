//! 追踪初始化、trace_id 生成与桥接计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub records_normalized: u64,
    pub records_rejected: u64,
    pub entries_appended: u64,
    pub append_failures: u64,
    pub append_retries: u64,
    pub transport_errors: u64,
}

/// 进程级桥接计数器。
pub struct BridgeMetrics {
    messages_received: AtomicU64,
    records_normalized: AtomicU64,
    records_rejected: AtomicU64,
    entries_appended: AtomicU64,
    append_failures: AtomicU64,
    append_retries: AtomicU64,
    transport_errors: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            records_normalized: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            entries_appended: AtomicU64::new(0),
            append_failures: AtomicU64::new(0),
            append_retries: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            records_normalized: self.records_normalized.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            append_retries: self.append_retries.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<BridgeMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static BridgeMetrics {
    METRICS.get_or_init(BridgeMetrics::new)
}

/// 初始化 tracing（默认 info，可用 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 为单条入站消息生成 trace_id。
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录收到的消息数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录规范化成功数。
pub fn record_record_normalized() {
    metrics().records_normalized.fetch_add(1, Ordering::Relaxed);
}

/// 记录被拒绝的报文数（解析/校验失败）。
pub fn record_record_rejected() {
    metrics().records_rejected.fetch_add(1, Ordering::Relaxed);
}

pub fn record_entry_appended() {
    metrics().entries_appended.fetch_add(1, Ordering::Relaxed);
}

pub fn record_append_failure() {
    metrics().append_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录追加重试次数（首次尝试不计入）。
pub fn record_append_retries(retries: u64) {
    if retries > 0 {
        metrics()
            .append_retries
            .fetch_add(retries, Ordering::Relaxed);
    }
}

/// 记录传输层错误数。
pub fn record_transport_error() {
    metrics().transport_errors.fetch_add(1, Ordering::Relaxed);
}
