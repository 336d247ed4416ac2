//! 桥接流水线：报文规范化 → 构建流条目 → 追加到流。
//!
//! 每条消息同步走完三个阶段，任一阶段失败都以 [`PipelineError`] 返回，
//! 由调用方决定如何记录；流水线本身不持有跨消息的可变状态。

mod entry;
mod forward;

pub use entry::EntryBuilder;
pub use forward::{ForwardError, ForwardReceipt, Forwarder, RetryPolicy};

use ems_normalize::{NormalizeError, Normalizer};
use tracing::info;

/// 流水线错误（按阶段区分）。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("normalize failed: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("forward failed: {0}")]
    Forward(#[from] ForwardError),
}

/// 单条消息的处理入口。
#[derive(Clone)]
pub struct BridgePipeline {
    normalizer: Normalizer,
    builder: EntryBuilder,
    forwarder: Forwarder,
}

impl BridgePipeline {
    pub fn new(normalizer: Normalizer, builder: EntryBuilder, forwarder: Forwarder) -> Self {
        Self {
            normalizer,
            builder,
            forwarder,
        }
    }

    pub async fn process(&self, payload: &[u8]) -> Result<ForwardReceipt, PipelineError> {
        let record = self.normalizer.normalize(payload)?;
        info!(
            target: "ems.pipeline",
            alias = %record.alias,
            ts_seconds = record.timestamp.seconds,
            ts_nanos = record.timestamp.nanos,
            value = record.value,
            quality = %record.quality,
            "record_normalized"
        );
        let entry = self.builder.build(record);
        Ok(self.forwarder.forward(entry).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{Quality, StreamDefinition, StreamEntry, TimestampPrecision, Variant};
    use ems_stream::{StreamError, StreamService};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingStream {
        appended: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl StreamService for RecordingStream {
        async fn delete_stream(&self, _name: &str) -> Result<(), StreamError> {
            Ok(())
        }

        async fn create_stream(&self, _definition: &StreamDefinition) -> Result<(), StreamError> {
            Ok(())
        }

        async fn append_message(&self, stream_name: &str, data: &[u8]) -> Result<u64, StreamError> {
            let mut appended = self.appended.lock().await;
            appended.push((stream_name.to_string(), data.to_vec()));
            Ok(appended.len() as u64 - 1)
        }
    }

    fn pipeline(stream: Arc<RecordingStream>) -> BridgePipeline {
        BridgePipeline::new(
            Normalizer::new(),
            EntryBuilder::new(TimestampPrecision::Seconds),
            Forwarder::new(stream, "s1"),
        )
    }

    #[tokio::test]
    async fn sample_payload_reaches_forwarder() {
        let stream = Arc::new(RecordingStream::default());
        let pipeline = pipeline(stream.clone());
        let payload = br#"{"timestamp":"1680869520.0","alias":"Gnn6000_21-101-AGICODE","value":4.0,"quality":"GOOD"}"#;

        let receipt = pipeline.process(payload).await.expect("processed");
        assert_eq!(receipt.sequence_number, 0);

        let appended = stream.appended.lock().await;
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].0, "s1");
        let entry: StreamEntry = serde_json::from_slice(&appended[0].1).expect("decode");
        assert_eq!(entry.property_alias(), "Gnn6000_21-101-AGICODE");
        let value = &entry.property_values()[0];
        assert_eq!(value.value, Variant::DoubleValue(4.0));
        assert_eq!(value.quality, Quality::Good);
        assert_eq!(value.timestamp.time_in_seconds, 1_680_869_520);
    }

    #[tokio::test]
    async fn unknown_quality_never_reaches_forwarder() {
        let stream = Arc::new(RecordingStream::default());
        let pipeline = pipeline(stream.clone());
        let payload = br#"{"timestamp":"1680869520.0","alias":"a","value":4.0,"quality":"unknown"}"#;

        let err = pipeline.process(payload).await.expect_err("rejected");
        assert!(matches!(
            err,
            PipelineError::Normalize(NormalizeError::UnknownQuality(_))
        ));
        assert!(stream.appended.lock().await.is_empty());
    }

    #[tokio::test]
    async fn identical_payloads_get_distinct_entry_ids() {
        let stream = Arc::new(RecordingStream::default());
        let pipeline = pipeline(stream.clone());
        let payload = br#"{"timestamp":"1","alias":"a","value":1,"quality":"bad"}"#;

        let first = pipeline.process(payload).await.expect("first");
        let second = pipeline.process(payload).await.expect("second");
        assert_ne!(first.entry_id, second.entry_id);
        assert_eq!(second.sequence_number, 1);
    }
}
