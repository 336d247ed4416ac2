//! 流服务接口
//!
//! 桥接只依赖三个操作：删除流、创建流、追加消息。
//! 缓冲、批量导出、导出失败重试均由流服务自身负责。

use crate::error::StreamError;
use async_trait::async_trait;
use domain::StreamDefinition;

/// 流服务接口
#[async_trait]
pub trait StreamService: Send + Sync {
    /// 删除流；流不存在时返回 `StreamError::NotFound`。
    async fn delete_stream(&self, name: &str) -> Result<(), StreamError>;

    /// 按定义创建流；同名流已存在时返回 `StreamError::AlreadyExists`。
    async fn create_stream(&self, definition: &StreamDefinition) -> Result<(), StreamError>;

    /// 追加一条已序列化的消息，返回流服务分配的单调递增序号（从 0 开始）。
    async fn append_message(&self, stream_name: &str, data: &[u8]) -> Result<u64, StreamError>;
}
