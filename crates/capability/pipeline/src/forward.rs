use domain::StreamEntry;
use ems_stream::{StreamError, StreamService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 本地重试策略。
///
/// 只重试 `StreamError::is_retryable()` 的失败；每次重发都换用新的 entry_id。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u64,
    pub backoff_ms: u64,
}

/// 转发错误。
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("append to {stream} failed after {attempts} attempt(s): {source}")]
    Append {
        stream: String,
        attempts: u64,
        #[source]
        source: StreamError,
    },
}

/// 追加成功的回执。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReceipt {
    pub entry_id: Uuid,
    pub sequence_number: u64,
    pub attempts: u64,
}

/// 将条目序列化后追加到指定流。
#[derive(Clone)]
pub struct Forwarder {
    service: Arc<dyn StreamService>,
    stream_name: String,
    retry: RetryPolicy,
}

impl Forwarder {
    pub fn new(service: Arc<dyn StreamService>, stream_name: impl Into<String>) -> Self {
        Self {
            service,
            stream_name: stream_name.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn forward(&self, mut entry: StreamEntry) -> Result<ForwardReceipt, ForwardError> {
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            let data = serde_json::to_vec(&entry)
                .map_err(|err| ForwardError::Serialize(err.to_string()))?;
            let entry_id = entry.entry_id();
            match self.service.append_message(&self.stream_name, &data).await {
                Ok(sequence_number) => {
                    info!(
                        target: "ems.pipeline",
                        stream = %self.stream_name,
                        sequence_number = sequence_number,
                        entry_id = %entry_id,
                        property_alias = %entry.property_alias(),
                        attempts = attempts,
                        "entry_appended"
                    );
                    debug!(
                        target: "ems.pipeline",
                        entry_id = %entry_id,
                        message = %String::from_utf8_lossy(&data),
                        "entry_payload"
                    );
                    return Ok(ForwardReceipt {
                        entry_id,
                        sequence_number,
                        attempts,
                    });
                }
                Err(err) if err.is_retryable() && attempts <= self.retry.max_retries => {
                    warn!(
                        target: "ems.pipeline",
                        stream = %self.stream_name,
                        entry_id = %entry_id,
                        attempt = attempts,
                        error = %err,
                        "entry_append_retry"
                    );
                    entry = entry.with_entry_id(Uuid::new_v4());
                    if self.retry.backoff_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.retry.backoff_ms)).await;
                    }
                }
                Err(err) => {
                    return Err(ForwardError::Append {
                        stream: self.stream_name.clone(),
                        attempts,
                        source: err,
                    });
                }
            }
        }
    }
}
