use async_trait::async_trait;
use domain::InboundMessage;
use ems_ingest::{IngestError, MessageHandler};
use ems_pipeline::{BridgePipeline, ForwardError, PipelineError};
use ems_telemetry::{
    new_trace_id, record_append_failure, record_append_retries, record_entry_appended,
    record_record_normalized, record_record_rejected,
};
use tracing::{Instrument, info, info_span, warn};

/// 入站消息处理器：每条消息在独立 span 中走一遍流水线。
///
/// 失败只影响当前消息，错误以 `IngestError::Handler` 交回订阅控制器记录。
pub struct BridgeHandler {
    pipeline: BridgePipeline,
}

impl BridgeHandler {
    pub fn new(pipeline: BridgePipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl MessageHandler for BridgeHandler {
    async fn handle(&self, message: InboundMessage) -> Result<(), IngestError> {
        let trace_id = new_trace_id();
        let span = info_span!("message", trace_id = %trace_id, topic = %message.topic);
        async move {
            info!(
                target: "ems.bridge",
                payload_size = message.payload.len(),
                received_at_ms = message.received_at_ms,
                "message_received"
            );
            match self.pipeline.process(&message.payload).await {
                Ok(receipt) => {
                    record_record_normalized();
                    record_entry_appended();
                    record_append_retries(receipt.attempts.saturating_sub(1));
                    Ok(())
                }
                Err(PipelineError::Normalize(err)) => {
                    record_record_rejected();
                    warn!(target: "ems.bridge", error = %err, "record_rejected");
                    Err(IngestError::Handler(err.to_string()))
                }
                Err(PipelineError::Forward(err)) => {
                    record_record_normalized();
                    record_append_failure();
                    if let ForwardError::Append { attempts, .. } = &err {
                        record_append_retries(attempts.saturating_sub(1));
                    }
                    warn!(target: "ems.bridge", error = %err, "entry_dropped");
                    Err(IngestError::Handler(err.to_string()))
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{SiteWiseExportConfig, StreamDefinition, StreamEntry, TimestampPrecision};
    use ems_normalize::Normalizer;
    use ems_pipeline::{EntryBuilder, Forwarder};
    use ems_stream::{InMemoryStreamService, StreamService};
    use std::sync::Arc;

    async fn handler_with_stream() -> (BridgeHandler, Arc<InMemoryStreamService>) {
        let stream = Arc::new(InMemoryStreamService::new());
        let definition = StreamDefinition::overwrite_oldest(
            "SiteWise_Stream",
            10,
            SiteWiseExportConfig {
                identifier: "IoTSiteWiseExportSiteWise_Stream".to_string(),
                batch_size: 5,
            },
        );
        stream.create_stream(&definition).await.expect("create");
        let pipeline = BridgePipeline::new(
            Normalizer::new(),
            EntryBuilder::new(TimestampPrecision::Nanos),
            Forwarder::new(stream.clone(), "SiteWise_Stream"),
        );
        (BridgeHandler::new(pipeline), stream)
    }

    fn message(payload: &str) -> InboundMessage {
        InboundMessage {
            topic: "telemetry/topic".to_string(),
            payload: payload.as_bytes().to_vec(),
            received_at_ms: 1,
        }
    }

    #[tokio::test]
    async fn valid_payload_is_appended_with_sub_second_offset() {
        let (handler, stream) = handler_with_stream().await;
        handler
            .handle(message(
                r#"{"timestamp":"1680869520.25","alias":"Gnn6000_21-101-AGICODE","value":4.0,"quality":"GOOD"}"#,
            ))
            .await
            .expect("handled");

        let stored = stream
            .read_messages("SiteWise_Stream", 0, 10)
            .expect("read");
        assert_eq!(stored.len(), 1);
        let entry: StreamEntry = serde_json::from_slice(&stored[0].data).expect("decode");
        assert_eq!(entry.property_alias(), "Gnn6000_21-101-AGICODE");
        let timestamp = entry.property_values()[0].timestamp;
        assert_eq!(timestamp.time_in_seconds, 1_680_869_520);
        assert_eq!(timestamp.offset_in_nanos, 250_000_000);
    }

    #[tokio::test]
    async fn rejected_payload_is_reported_and_not_appended() {
        let (handler, stream) = handler_with_stream().await;
        let err = handler
            .handle(message(
                r#"{"timestamp":"1680869520.0","alias":"a","value":4.0,"quality":"unknown"}"#,
            ))
            .await
            .expect_err("rejected");
        assert!(matches!(err, IngestError::Handler(_)));
        assert_eq!(stream.len("SiteWise_Stream"), 0);
    }

    #[tokio::test]
    async fn missing_stream_drops_the_entry() {
        let stream = Arc::new(InMemoryStreamService::new());
        let pipeline = BridgePipeline::new(
            Normalizer::new(),
            EntryBuilder::default(),
            Forwarder::new(stream, "absent"),
        );
        let handler = BridgeHandler::new(pipeline);
        let err = handler
            .handle(message(
                r#"{"timestamp":"1","alias":"a","value":1.0,"quality":"BAD"}"#,
            ))
            .await
            .expect_err("dropped");
        assert!(matches!(err, IngestError::Handler(_)));
    }
}
