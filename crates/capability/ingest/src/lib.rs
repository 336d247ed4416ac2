//! 订阅能力：pub/sub 传输抽象、MQTT 实现与订阅生命周期控制。

mod controller;
mod mqtt;

pub use controller::{
    StreamErrorAction, SubscriptionController, SubscriptionOutcome, SubscriptionState,
};
pub use mqtt::{MqttTransport, MqttTransportConfig};

use async_trait::async_trait;
use domain::InboundMessage;
use tokio::sync::mpsc;

/// 订阅错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unauthorized to subscribe to topic: {0}")]
    Unauthorized(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("not subscribed")]
    NotSubscribed,
}

impl IngestError {
    /// 致命错误：订阅无法继续，进程应以非零状态退出。
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Unauthorized(_) | IngestError::Subscribe(_))
    }
}

/// 入站消息处理器。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> Result<(), IngestError>;
}

/// 传输层投递给订阅方的事件。
#[derive(Debug)]
pub enum TransportEvent {
    Message(InboundMessage),
    Error(IngestError),
    Closed,
}

/// 订阅操作句柄，用于主动关闭订阅。
#[async_trait]
pub trait OperationHandle: Send + Sync {
    async fn close(&self) -> Result<(), IngestError>;
}

/// 一次成功订阅：事件流 + 操作句柄。
pub struct Subscription {
    pub events: mpsc::Receiver<TransportEvent>,
    pub handle: Box<dyn OperationHandle>,
}

/// pub/sub 传输抽象。
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// 订阅 topic；返回前应确认订阅已被接受（未授权返回 `IngestError::Unauthorized`）。
    async fn subscribe(&self, topic: &str) -> Result<Subscription, IngestError>;
}
