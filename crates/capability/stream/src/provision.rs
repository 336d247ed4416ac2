//! 流准备器
//!
//! 订阅开始前执行一次：先删除同名旧流（不存在视为正常），再按定义创建新流，
//! 保证每次进程运行都从一个已知为空的流开始。

use crate::error::StreamError;
use crate::traits::StreamService;
use domain::StreamDefinition;
use std::sync::Arc;
use tracing::info;

/// 流准备器
#[derive(Clone)]
pub struct StreamProvisioner {
    service: Arc<dyn StreamService>,
}

impl StreamProvisioner {
    pub fn new(service: Arc<dyn StreamService>) -> Self {
        Self { service }
    }

    /// 删除旧流并重建。
    ///
    /// 删除时除 `NotFound` 外的任何错误都直接返回，调用方应视为致命错误。
    pub async fn provision(&self, definition: &StreamDefinition) -> Result<(), StreamError> {
        match self.service.delete_stream(&definition.name).await {
            Ok(()) => {
                info!(target: "ems.stream", stream = %definition.name, "stale_stream_deleted");
            }
            Err(StreamError::NotFound(_)) => {
                info!(target: "ems.stream", stream = %definition.name, "no_stale_stream");
            }
            Err(err) => return Err(err),
        }

        self.service.create_stream(definition).await?;
        info!(
            target: "ems.stream",
            stream = %definition.name,
            max_messages = definition.max_messages,
            strategy_on_full = ?definition.strategy_on_full,
            export_targets = definition.export_targets().len(),
            "stream_created"
        );
        Ok(())
    }
}
