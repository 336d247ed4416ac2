//! Redis Streams 流服务
//!
//! 每个流占用三个键：
//! - `{prefix}:{name}:definition`：流定义 JSON（流是否存在以此为准）
//! - `{prefix}:{name}:entries`：Redis Stream 本体，每个导出目标对应一个消费组
//! - `{prefix}:{name}:sequence`：追加序号计数器
//!
//! `OverwriteOldestData` 通过 `XADD MAXLEN` 精确裁剪实现，裁剪不区分是否已被消费组确认。

use crate::error::StreamError;
use crate::traits::StreamService;
use crate::validate_definition;
use domain::{StrategyOnFull, StreamDefinition};
use redis::AsyncCommands;
use tracing::info;

const DEFAULT_KEY_PREFIX: &str = "ems:stream";

/// Redis Streams 流服务
pub struct RedisStreamService {
    client: redis::Client,
    key_prefix: String,
}

impl RedisStreamService {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| StreamError::InvalidRequest(err.to_string()))?;
        Ok(Self::new(client))
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    fn definition_key(&self, name: &str) -> String {
        format!("{}:{}:definition", self.key_prefix, name)
    }

    fn entries_key(&self, name: &str) -> String {
        format!("{}:{}:entries", self.key_prefix, name)
    }

    fn sequence_key(&self, name: &str) -> String {
        format!("{}:{}:sequence", self.key_prefix, name)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StreamError> {
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }
}

#[async_trait::async_trait]
impl StreamService for RedisStreamService {
    async fn delete_stream(&self, name: &str) -> Result<(), StreamError> {
        let mut connection = self.connection().await?;
        let definition_key = self.definition_key(name);
        let existed: bool = connection.exists(&definition_key).await?;
        if !existed {
            return Err(StreamError::NotFound(name.to_string()));
        }
        let _: () = connection
            .del(vec![
                definition_key,
                self.entries_key(name),
                self.sequence_key(name),
            ])
            .await?;
        Ok(())
    }

    async fn create_stream(&self, definition: &StreamDefinition) -> Result<(), StreamError> {
        validate_definition(definition)?;
        let payload = serde_json::to_string(definition)
            .map_err(|err| StreamError::InvalidRequest(err.to_string()))?;
        let mut connection = self.connection().await?;
        let created: bool = connection
            .set_nx(self.definition_key(&definition.name), payload)
            .await?;
        if !created {
            return Err(StreamError::AlreadyExists(definition.name.clone()));
        }

        // 清掉无定义的残留数据，保证新流从空开始
        let entries_key = self.entries_key(&definition.name);
        let _: () = connection
            .del(vec![entries_key.clone(), self.sequence_key(&definition.name)])
            .await?;
        for target in definition.export_targets() {
            let _: () = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&entries_key)
                .arg(&target.identifier)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut connection)
                .await?;
            info!(
                target: "ems.stream",
                stream = %definition.name,
                export_identifier = %target.identifier,
                batch_size = target.batch_size,
                "redis_export_group_created"
            );
        }
        Ok(())
    }

    async fn append_message(&self, stream_name: &str, data: &[u8]) -> Result<u64, StreamError> {
        let mut connection = self.connection().await?;
        let payload: Option<String> = connection.get(self.definition_key(stream_name)).await?;
        let Some(payload) = payload else {
            return Err(StreamError::NotFound(stream_name.to_string()));
        };
        let definition: StreamDefinition = serde_json::from_str(&payload)
            .map_err(|err| StreamError::Backend(format!("corrupt stream definition: {}", err)))?;

        let entries_key = self.entries_key(stream_name);
        let mut xadd = redis::cmd("XADD");
        xadd.arg(&entries_key);
        match definition.strategy_on_full {
            StrategyOnFull::OverwriteOldestData => {
                xadd.arg("MAXLEN").arg(definition.max_messages);
            }
            StrategyOnFull::RejectNewData => {
                let len: u64 = redis::cmd("XLEN")
                    .arg(&entries_key)
                    .query_async(&mut connection)
                    .await?;
                if len >= definition.max_messages {
                    return Err(StreamError::StreamFull(stream_name.to_string()));
                }
            }
        }
        xadd.arg("*").arg("data").arg(data);

        let (sequence, _id): (u64, String) = redis::pipe()
            .atomic()
            .incr(self.sequence_key(stream_name), 1)
            .add_command(xadd)
            .query_async(&mut connection)
            .await?;
        Ok(sequence.saturating_sub(1))
    }
}
