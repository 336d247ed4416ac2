pub mod data;
pub mod entry;
pub mod stream;

pub use data::{EventTimestamp, InboundMessage, Quality, TelemetryRecord, TimestampPrecision};
pub use entry::{AssetPropertyValue, StreamEntry, TimeInNanos, Variant};
pub use stream::{ExportDefinition, SiteWiseExportConfig, StrategyOnFull, StreamDefinition};
