use domain::{
    AssetPropertyValue, StreamEntry, TelemetryRecord, TimeInNanos, TimestampPrecision, Variant,
};
use uuid::Uuid;

/// TelemetryRecord -> StreamEntry 构建器。
///
/// 每次构建都生成新的随机 entry_id，相同输入也不复用。
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryBuilder {
    precision: TimestampPrecision,
}

impl EntryBuilder {
    pub fn new(precision: TimestampPrecision) -> Self {
        Self { precision }
    }

    pub fn build(&self, record: TelemetryRecord) -> StreamEntry {
        let offset_in_nanos = match self.precision {
            TimestampPrecision::Seconds => 0,
            TimestampPrecision::Nanos => record.timestamp.nanos,
        };
        let value = AssetPropertyValue {
            value: Variant::DoubleValue(record.value),
            quality: record.quality,
            timestamp: TimeInNanos::new(record.timestamp.seconds, offset_in_nanos),
        };
        StreamEntry::new(Uuid::new_v4(), record.alias, vec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EventTimestamp, Quality};

    fn sample_record() -> TelemetryRecord {
        TelemetryRecord {
            alias: "Gnn6000_21-101-AGICODE".to_string(),
            timestamp: EventTimestamp::new(1_680_869_520, 993_000_000),
            value: 4.0,
            quality: Quality::Uncertain,
        }
    }

    #[test]
    fn build_wraps_single_double_value() {
        let entry = EntryBuilder::default().build(sample_record());
        assert_eq!(entry.property_alias(), "Gnn6000_21-101-AGICODE");
        assert_eq!(entry.property_values().len(), 1);
        let value = &entry.property_values()[0];
        assert_eq!(value.value, Variant::DoubleValue(4.0));
        assert_eq!(value.quality, Quality::Uncertain);
    }

    #[test]
    fn seconds_precision_drops_sub_second_offset() {
        let entry = EntryBuilder::new(TimestampPrecision::Seconds).build(sample_record());
        let timestamp = entry.property_values()[0].timestamp;
        assert_eq!(timestamp, TimeInNanos::new(1_680_869_520, 0));
        assert_eq!(timestamp.as_nanos(), 1_680_869_520_000_000_000);
    }

    #[test]
    fn nanos_precision_keeps_sub_second_offset() {
        let entry = EntryBuilder::new(TimestampPrecision::Nanos).build(sample_record());
        let timestamp = entry.property_values()[0].timestamp;
        assert_eq!(timestamp.time_in_seconds, 1_680_869_520);
        assert_eq!(timestamp.offset_in_nanos, 993_000_000);
    }

    #[test]
    fn entry_ids_are_unique_for_identical_input() {
        let builder = EntryBuilder::default();
        let ids: std::collections::HashSet<Uuid> = (0..100)
            .map(|_| builder.build(sample_record()).entry_id())
            .collect();
        assert_eq!(ids.len(), 100);
    }
}
