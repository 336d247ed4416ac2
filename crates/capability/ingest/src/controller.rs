//! 订阅生命周期控制
//!
//! 状态流转：`Idle → Subscribed → Receiving → Closed`；
//! 未授权或不可恢复的传输错误进入 `Failed`。
//!
//! - 消息事件：交给 `MessageHandler`，处理失败由处理器记录日志，订阅继续
//! - 传输错误事件：按 `StreamErrorAction` 处理，默认保持订阅
//! - 传输关闭事件：记录日志并退出接收循环，不自动重新订阅
//! - 关停信号：关闭订阅句柄后退出

use crate::{IngestError, MessageHandler, PubSubTransport, Subscription, TransportEvent};
use domain::InboundMessage;
use ems_telemetry::{record_message_received, record_transport_error};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 订阅状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribed,
    Receiving,
    Closed,
    Failed,
}

/// 传输错误后的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamErrorAction {
    #[default]
    KeepOpen,
    Close,
}

/// 接收循环结束的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// 收到关停信号。
    Interrupted,
    /// 传输层关闭了订阅。
    RemoteClosed,
    /// 传输错误后按策略关闭。
    ClosedOnError,
}

/// 订阅控制器。
pub struct SubscriptionController {
    transport: Arc<dyn PubSubTransport>,
    handler: Arc<dyn MessageHandler>,
    topic: String,
    error_action: StreamErrorAction,
    state: SubscriptionState,
    subscription: Option<Subscription>,
}

impl SubscriptionController {
    pub fn new(
        transport: Arc<dyn PubSubTransport>,
        handler: Arc<dyn MessageHandler>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            handler,
            topic: topic.into(),
            error_action: StreamErrorAction::default(),
            state: SubscriptionState::Idle,
            subscription: None,
        }
    }

    pub fn with_stream_error_action(mut self, action: StreamErrorAction) -> Self {
        self.error_action = action;
        self
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// 订阅 topic（仅允许在 `Idle` 状态调用）。
    pub async fn subscribe(&mut self) -> Result<(), IngestError> {
        if self.state != SubscriptionState::Idle {
            return Err(IngestError::Subscribe(format!(
                "cannot subscribe in state {:?}",
                self.state
            )));
        }
        match self.transport.subscribe(&self.topic).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.state = SubscriptionState::Subscribed;
                info!(target: "ems.ingest", topic = %self.topic, "subscribed");
                Ok(())
            }
            Err(err) => {
                self.state = SubscriptionState::Failed;
                error!(target: "ems.ingest", topic = %self.topic, error = %err, "subscribe_failed");
                Err(err)
            }
        }
    }

    /// 传输错误回调：记录并返回处理方式。
    pub fn on_stream_error(&self, err: &IngestError) -> StreamErrorAction {
        record_transport_error();
        warn!(
            target: "ems.ingest",
            topic = %self.topic,
            error = %err,
            action = ?self.error_action,
            "subscription_stream_error"
        );
        self.error_action
    }

    /// 接收循环，阻塞直到关停信号、传输关闭或致命错误。
    pub async fn run(
        &mut self,
        shutdown: CancellationToken,
    ) -> Result<SubscriptionOutcome, IngestError> {
        let Some(mut subscription) = self.subscription.take() else {
            return Err(IngestError::NotSubscribed);
        };
        self.state = SubscriptionState::Receiving;

        let outcome = loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => None,
                event = subscription.events.recv() => Some(event),
            };
            let Some(event) = event else {
                info!(target: "ems.ingest", topic = %self.topic, "subscription_interrupted");
                break SubscriptionOutcome::Interrupted;
            };

            match event {
                Some(TransportEvent::Message(message)) => self.dispatch(message).await,
                Some(TransportEvent::Error(err)) if err.is_fatal() => {
                    record_transport_error();
                    error!(target: "ems.ingest", topic = %self.topic, error = %err, "subscription_failed");
                    self.state = SubscriptionState::Failed;
                    if let Err(close_err) = subscription.handle.close().await {
                        warn!(target: "ems.ingest", error = %close_err, "subscription_close_failed");
                    }
                    return Err(err);
                }
                Some(TransportEvent::Error(err)) => match self.on_stream_error(&err) {
                    StreamErrorAction::KeepOpen => {}
                    StreamErrorAction::Close => break SubscriptionOutcome::ClosedOnError,
                },
                Some(TransportEvent::Closed) | None => {
                    info!(target: "ems.ingest", topic = %self.topic, "subscription_stream_closed");
                    self.state = SubscriptionState::Closed;
                    return Ok(SubscriptionOutcome::RemoteClosed);
                }
            }
        };

        if let Err(err) = subscription.handle.close().await {
            warn!(target: "ems.ingest", topic = %self.topic, error = %err, "subscription_close_failed");
        }
        self.state = SubscriptionState::Closed;
        info!(target: "ems.ingest", topic = %self.topic, outcome = ?outcome, "subscription_closed");
        Ok(outcome)
    }

    async fn dispatch(&self, message: InboundMessage) {
        record_message_received();
        let topic = message.topic.clone();
        let payload_size = message.payload.len();
        if let Err(err) = self.handler.handle(message).await {
            // 失败明细由处理器记录
            debug!(
                target: "ems.ingest",
                topic = %topic,
                payload_size = payload_size,
                error = %err,
                "message_handling_failed"
            );
        }
    }
}
