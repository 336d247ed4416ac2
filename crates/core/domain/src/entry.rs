//! 流条目：追加到流中的不可变资产属性值记录。
//!
//! 序列化结果即流服务要求的线格式（camelCase JSON）：
//!
//! ```json
//! {
//!   "entryId": "…",
//!   "propertyAlias": "Gnn6000_21-101-AGICODE",
//!   "propertyValues": [
//!     {
//!       "value": { "doubleValue": 4.0 },
//!       "quality": "GOOD",
//!       "timestamp": { "timeInSeconds": 1680869520, "offsetInNanos": 0 }
//!     }
//!   ]
//! }
//! ```

use crate::data::Quality;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// 纳秒精度时间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInNanos {
    pub time_in_seconds: i64,
    pub offset_in_nanos: u32,
}

impl TimeInNanos {
    pub fn new(time_in_seconds: i64, offset_in_nanos: u32) -> Self {
        Self {
            time_in_seconds,
            offset_in_nanos,
        }
    }

    /// 自 epoch 起的纳秒数（溢出时饱和）。
    pub fn as_nanos(&self) -> i64 {
        self.time_in_seconds
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(i64::from(self.offset_in_nanos))
    }
}

/// 属性值变体（本桥接只产出 double）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    DoubleValue(f64),
}

/// 单个带质量与时间戳的属性值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPropertyValue {
    pub value: Variant,
    pub quality: Quality,
    pub timestamp: TimeInNanos,
}

/// 流条目，构建后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    entry_id: Uuid,
    property_alias: String,
    property_values: Vec<AssetPropertyValue>,
}

impl StreamEntry {
    pub fn new(
        entry_id: Uuid,
        property_alias: impl Into<String>,
        property_values: Vec<AssetPropertyValue>,
    ) -> Self {
        Self {
            entry_id,
            property_alias: property_alias.into(),
            property_values,
        }
    }

    /// 换用新的 entry_id，其余内容不变（重发时使用）。
    pub fn with_entry_id(self, entry_id: Uuid) -> Self {
        Self { entry_id, ..self }
    }

    pub fn entry_id(&self) -> Uuid {
        self.entry_id
    }

    pub fn property_alias(&self) -> &str {
        &self.property_alias
    }

    pub fn property_values(&self) -> &[AssetPropertyValue] {
        &self.property_values
    }
}
