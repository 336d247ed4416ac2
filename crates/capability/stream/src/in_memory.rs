//! 内存流服务
//!
//! 每个流是一个有界环形缓冲：序号从 0 单调递增，写满后按 `StrategyOnFull`
//! 丢弃最旧消息或拒绝新消息。每个导出目标维护独立游标，
//! `next_export_batch` 按 `batch_size` 取出下一批未导出消息。

use crate::error::StreamError;
use crate::traits::StreamService;
use crate::validate_definition;
use domain::{StrategyOnFull, StreamDefinition};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// 流中的一条消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub sequence_number: u64,
    pub data: Vec<u8>,
}

struct MemoryStream {
    definition: StreamDefinition,
    messages: VecDeque<StoredMessage>,
    next_sequence: u64,
    export_cursors: HashMap<String, u64>,
    overwritten: u64,
}

impl MemoryStream {
    fn new(definition: StreamDefinition) -> Self {
        let export_cursors = definition
            .export_targets()
            .iter()
            .map(|target| (target.identifier.clone(), 0))
            .collect();
        Self {
            definition,
            messages: VecDeque::new(),
            next_sequence: 0,
            export_cursors,
            overwritten: 0,
        }
    }

    fn capacity(&self) -> usize {
        usize::try_from(self.definition.max_messages).unwrap_or(usize::MAX)
    }

    fn append(&mut self, data: &[u8]) -> Result<u64, StreamError> {
        if self.messages.len() >= self.capacity() {
            match self.definition.strategy_on_full {
                StrategyOnFull::OverwriteOldestData => {
                    while self.messages.len() >= self.capacity() {
                        self.messages.pop_front();
                        self.overwritten = self.overwritten.saturating_add(1);
                    }
                }
                StrategyOnFull::RejectNewData => {
                    return Err(StreamError::StreamFull(self.definition.name.clone()));
                }
            }
        }
        let sequence_number = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.messages.push_back(StoredMessage {
            sequence_number,
            data: data.to_vec(),
        });
        Ok(sequence_number)
    }
}

/// 内存流服务
pub struct InMemoryStreamService {
    streams: RwLock<HashMap<String, MemoryStream>>,
}

impl Default for InMemoryStreamService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStreamService {
    /// 创建空的流服务
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// 获取流定义（用于测试）
    pub fn definition(&self, name: &str) -> Option<StreamDefinition> {
        let streams = self.streams.read().ok()?;
        streams.get(name).map(|stream| stream.definition.clone())
    }

    /// 流中当前保留的消息数
    pub fn len(&self, name: &str) -> usize {
        self.streams
            .read()
            .ok()
            .and_then(|streams| streams.get(name).map(|stream| stream.messages.len()))
            .unwrap_or(0)
    }

    /// 因写满被覆盖的消息数
    pub fn overwritten(&self, name: &str) -> u64 {
        self.streams
            .read()
            .ok()
            .and_then(|streams| streams.get(name).map(|stream| stream.overwritten))
            .unwrap_or(0)
    }

    /// 从指定序号开始读取最多 `max` 条消息
    pub fn read_messages(
        &self,
        name: &str,
        from_sequence: u64,
        max: usize,
    ) -> Result<Vec<StoredMessage>, StreamError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| StreamError::Backend("lock failed".to_string()))?;
        let stream = streams
            .get(name)
            .ok_or_else(|| StreamError::NotFound(name.to_string()))?;
        Ok(stream
            .messages
            .iter()
            .filter(|message| message.sequence_number >= from_sequence)
            .take(max)
            .cloned()
            .collect())
    }

    /// 取出某导出目标的下一批未导出消息，并推进该目标的游标
    ///
    /// 已被覆盖的消息直接跳过。
    pub fn next_export_batch(
        &self,
        name: &str,
        identifier: &str,
    ) -> Result<Vec<StoredMessage>, StreamError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| StreamError::Backend("lock failed".to_string()))?;
        let stream = streams
            .get_mut(name)
            .ok_or_else(|| StreamError::NotFound(name.to_string()))?;
        let batch_size = stream
            .definition
            .export_targets()
            .iter()
            .find(|target| target.identifier == identifier)
            .map(|target| target.batch_size as usize)
            .ok_or_else(|| {
                StreamError::InvalidRequest(format!("unknown export target: {}", identifier))
            })?;
        let cursor = stream.export_cursors.get(identifier).copied().unwrap_or(0);
        let batch: Vec<StoredMessage> = stream
            .messages
            .iter()
            .filter(|message| message.sequence_number >= cursor)
            .take(batch_size)
            .cloned()
            .collect();
        if let Some(last) = batch.last() {
            stream
                .export_cursors
                .insert(identifier.to_string(), last.sequence_number + 1);
        }
        Ok(batch)
    }
}

#[async_trait::async_trait]
impl StreamService for InMemoryStreamService {
    async fn delete_stream(&self, name: &str) -> Result<(), StreamError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| StreamError::Backend("lock failed".to_string()))?;
        match streams.remove(name) {
            Some(_) => Ok(()),
            None => Err(StreamError::NotFound(name.to_string())),
        }
    }

    async fn create_stream(&self, definition: &StreamDefinition) -> Result<(), StreamError> {
        validate_definition(definition)?;
        let mut streams = self
            .streams
            .write()
            .map_err(|_| StreamError::Backend("lock failed".to_string()))?;
        if streams.contains_key(&definition.name) {
            return Err(StreamError::AlreadyExists(definition.name.clone()));
        }
        streams.insert(definition.name.clone(), MemoryStream::new(definition.clone()));
        Ok(())
    }

    async fn append_message(&self, stream_name: &str, data: &[u8]) -> Result<u64, StreamError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| StreamError::Backend("lock failed".to_string()))?;
        let stream = streams
            .get_mut(stream_name)
            .ok_or_else(|| StreamError::NotFound(stream_name.to_string()))?;
        stream.append(data)
    }
}
