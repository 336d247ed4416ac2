use crate::{IngestError, OperationHandle, PubSubTransport, Subscription, TransportEvent};
use async_trait::async_trait;
use domain::InboundMessage;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// MQTT 传输配置。
#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    /// 事件通道容量（传输 → 控制器）。
    pub channel_capacity: usize,
}

/// MQTT 传输：订阅确认后由后台任务驱动 eventloop 并投递事件。
#[derive(Debug, Clone)]
pub struct MqttTransport {
    config: MqttTransportConfig,
}

impl MqttTransport {
    pub fn new(config: MqttTransportConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl PubSubTransport for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, IngestError> {
        let qos = qos_from_u8(self.config.qos);
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        client
            .subscribe(topic, qos)
            .await
            .map_err(|err| IngestError::Subscribe(err.to_string()))?;

        // 等待 SubAck，确认 broker 接受了订阅
        let mut pending = Vec::new();
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(IngestError::Unauthorized(topic.to_string()));
                    }
                    break;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    pending.push(inbound_message(&publish.topic, &publish.payload));
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(code)) if is_auth_refusal(&code) => {
                    return Err(IngestError::Unauthorized(topic.to_string()));
                }
                Err(err) => return Err(IngestError::Subscribe(err.to_string())),
            }
        }
        info!(
            target: "ems.ingest",
            host = %self.config.host,
            port = self.config.port,
            topic = %topic,
            "mqtt_subscription_acknowledged"
        );

        let (sender, events) = mpsc::channel(self.config.channel_capacity.max(1));
        let closing = CancellationToken::new();
        tokio::spawn(pump_events(
            eventloop,
            EventPump {
                client: client.clone(),
                topic: topic.to_string(),
                qos,
                sender,
                closing: closing.clone(),
            },
            pending,
        ));

        Ok(Subscription {
            events,
            handle: Box::new(MqttOperationHandle {
                client,
                topic: topic.to_string(),
                closing,
            }),
        })
    }
}

struct EventPump {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    sender: mpsc::Sender<TransportEvent>,
    closing: CancellationToken,
}

async fn pump_events(mut eventloop: EventLoop, pump: EventPump, pending: Vec<InboundMessage>) {
    for message in pending {
        if pump.sender.send(TransportEvent::Message(message)).await.is_err() {
            return;
        }
    }

    loop {
        let polled = tokio::select! {
            _ = pump.closing.cancelled() => break,
            _ = pump.sender.closed() => return,
            polled = eventloop.poll() => polled,
        };
        let event = match polled {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                TransportEvent::Message(inbound_message(&publish.topic, &publish.payload))
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) if !ack.session_present => {
                // 重连后的新会话不保留订阅，需要重新订阅
                if let Err(err) = pump.client.try_subscribe(pump.topic.clone(), pump.qos) {
                    TransportEvent::Error(IngestError::Transport(err.to_string()))
                } else {
                    continue;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack)))
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure)) =>
            {
                TransportEvent::Error(IngestError::Unauthorized(pump.topic.clone()))
            }
            Ok(Event::Incoming(Packet::Disconnect)) | Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                break;
            }
            Ok(_) => continue,
            Err(ConnectionError::ConnectionRefused(code)) if is_auth_refusal(&code) => {
                TransportEvent::Error(IngestError::Unauthorized(pump.topic.clone()))
            }
            Err(err) => TransportEvent::Error(IngestError::Transport(err.to_string())),
        };

        let is_error = matches!(event, TransportEvent::Error(_));
        if pump.sender.send(event).await.is_err() {
            return;
        }
        if is_error {
            // eventloop 下一次 poll 会自动重连
            tokio::select! {
                _ = pump.closing.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    }

    let _ = pump.sender.send(TransportEvent::Closed).await;
}

/// MQTT 订阅句柄：退订并断开连接。
struct MqttOperationHandle {
    client: AsyncClient,
    topic: String,
    closing: CancellationToken,
}

#[async_trait]
impl OperationHandle for MqttOperationHandle {
    async fn close(&self) -> Result<(), IngestError> {
        let unsubscribed = self.client.unsubscribe(self.topic.clone()).await;
        let disconnected = self.client.disconnect().await;
        if unsubscribed.is_err() || disconnected.is_err() {
            self.closing.cancel();
        }
        unsubscribed.map_err(|err| IngestError::Transport(err.to_string()))?;
        disconnected.map_err(|err| IngestError::Transport(err.to_string()))?;
        Ok(())
    }
}

fn inbound_message(topic: &str, payload: &[u8]) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        payload: payload.to_vec(),
        received_at_ms: now_epoch_ms(),
    }
}

fn is_auth_refusal(code: &ConnectReturnCode) -> bool {
    matches!(
        code,
        ConnectReturnCode::NotAuthorized | ConnectReturnCode::BadUserNamePassword
    )
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
