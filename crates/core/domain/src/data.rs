use serde::{Deserialize, Serialize};
use std::fmt;

/// 订阅 topic 上收到的原始消息。
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// 数据质量三态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Good,
    Bad,
    Uncertain,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "GOOD",
            Quality::Bad => "BAD",
            Quality::Uncertain => "UNCERTAIN",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 报文时间戳：整数秒 + 秒内纳秒偏移。
///
/// `seconds` 始终是截断后的整数秒；`nanos` 保留小数部分（0..1_000_000_000）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl EventTimestamp {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }
}

/// 时间戳精度策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPrecision {
    /// 只保留整数秒，秒内偏移恒为 0。
    Seconds,
    /// 保留秒内纳秒偏移。
    #[default]
    Nanos,
}

/// 校验通过的遥测记录。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub alias: String,
    pub timestamp: EventTimestamp,
    pub value: f64,
    pub quality: Quality,
}
