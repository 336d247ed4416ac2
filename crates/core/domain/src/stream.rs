use serde::{Deserialize, Serialize};

/// 流写满时的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyOnFull {
    /// 丢弃最早的未导出数据，为新数据腾出空间。
    OverwriteOldestData,
    /// 拒绝新数据。
    RejectNewData,
}

/// 时序库导出目标。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteWiseExportConfig {
    pub identifier: String,
    pub batch_size: u32,
}

/// 导出定义。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportDefinition {
    pub iot_sitewise: Vec<SiteWiseExportConfig>,
}

/// 流定义（名称、容量、写满策略、导出目标）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub name: String,
    pub max_messages: u64,
    pub strategy_on_full: StrategyOnFull,
    pub export_definition: ExportDefinition,
}

impl StreamDefinition {
    /// 覆盖最旧数据、单一导出目标的流定义。
    pub fn overwrite_oldest(
        name: impl Into<String>,
        max_messages: u64,
        export: SiteWiseExportConfig,
    ) -> Self {
        Self {
            name: name.into(),
            max_messages,
            strategy_on_full: StrategyOnFull::OverwriteOldestData,
            export_definition: ExportDefinition {
                iot_sitewise: vec![export],
            },
        }
    }

    pub fn export_targets(&self) -> &[SiteWiseExportConfig] {
        &self.export_definition.iot_sitewise
    }
}
