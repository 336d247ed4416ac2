//! # EMS Stream 模块
//!
//! 有界、可导出的时序流抽象，以及桥接启动时的流准备逻辑。
//!
//! ## 模块说明
//!
//! - [`traits`]：流服务接口（删除 / 创建 / 追加）
//! - [`error`]：流服务错误类型
//! - [`provision`]：流准备器（删除旧流后按定义重建）
//! - [`in_memory`]：内存流服务（用于测试和本地运行）
//! - [`redis_stream`]：基于 Redis Streams 的流服务
//!
//! ## 写满策略
//!
//! - `OverwriteOldestData`：容量耗尽时丢弃最早的未导出消息
//! - `RejectNewData`：容量耗尽时拒绝追加（`StreamError::StreamFull`）

pub mod error;
pub mod in_memory;
pub mod provision;
pub mod redis_stream;
pub mod traits;

pub use error::StreamError;
pub use in_memory::{InMemoryStreamService, StoredMessage};
pub use provision::StreamProvisioner;
pub use redis_stream::RedisStreamService;
pub use traits::StreamService;

use domain::StreamDefinition;

/// 校验流定义（名称非空、容量与批大小为正、导出标识非空）。
pub fn validate_definition(definition: &StreamDefinition) -> Result<(), StreamError> {
    if definition.name.trim().is_empty() {
        return Err(StreamError::InvalidRequest("stream name is empty".to_string()));
    }
    if definition.max_messages == 0 {
        return Err(StreamError::InvalidRequest(
            "max_messages must be positive".to_string(),
        ));
    }
    for target in definition.export_targets() {
        if target.identifier.trim().is_empty() {
            return Err(StreamError::InvalidRequest(
                "export identifier is empty".to_string(),
            ));
        }
        if target.batch_size == 0 {
            return Err(StreamError::InvalidRequest(format!(
                "export {} batch_size must be positive",
                target.identifier
            )));
        }
    }
    Ok(())
}
