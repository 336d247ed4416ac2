use async_trait::async_trait;
use domain::InboundMessage;
use ems_ingest::{
    IngestError, MessageHandler, OperationHandle, PubSubTransport, StreamErrorAction,
    Subscription, SubscriptionController, SubscriptionOutcome, SubscriptionState, TransportEvent,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

struct FakeHandle {
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl OperationHandle for FakeHandle {
    async fn close(&self) -> Result<(), IngestError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeTransport {
    subscription: Mutex<Option<Subscription>>,
    unauthorized: bool,
}

#[async_trait]
impl PubSubTransport for FakeTransport {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, IngestError> {
        if self.unauthorized {
            return Err(IngestError::Unauthorized(topic.to_string()));
        }
        self.subscription
            .lock()
            .await
            .take()
            .ok_or_else(|| IngestError::Subscribe("already taken".to_string()))
    }
}

/// 记录收到的 payload；payload 为 `bad` 时返回错误，为 `stop` 时触发关停。
struct RecordingHandler {
    received: Mutex<Vec<String>>,
    shutdown: CancellationToken,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: InboundMessage) -> Result<(), IngestError> {
        let payload = String::from_utf8_lossy(&message.payload).to_string();
        self.received.lock().await.push(payload.clone());
        match payload.as_str() {
            "bad" => Err(IngestError::Handler("rejected".to_string())),
            "stop" => {
                self.shutdown.cancel();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

struct Harness {
    controller: SubscriptionController,
    events: mpsc::Sender<TransportEvent>,
    handler: Arc<RecordingHandler>,
    closed: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

fn harness(unauthorized: bool) -> Harness {
    let (events, receiver) = mpsc::channel(16);
    let closed = Arc::new(AtomicBool::new(false));
    let transport = Arc::new(FakeTransport {
        subscription: Mutex::new(Some(Subscription {
            events: receiver,
            handle: Box::new(FakeHandle {
                closed: closed.clone(),
            }),
        })),
        unauthorized,
    });
    let shutdown = CancellationToken::new();
    let handler = Arc::new(RecordingHandler {
        received: Mutex::new(Vec::new()),
        shutdown: shutdown.clone(),
    });
    Harness {
        controller: SubscriptionController::new(transport, handler.clone(), "telemetry/topic"),
        events,
        handler,
        closed,
        shutdown,
    }
}

fn message(payload: &str) -> TransportEvent {
    TransportEvent::Message(InboundMessage {
        topic: "telemetry/topic".to_string(),
        payload: payload.as_bytes().to_vec(),
        received_at_ms: 1,
    })
}

#[tokio::test]
async fn handler_failures_do_not_end_subscription() {
    let mut h = harness(false);
    assert_eq!(h.controller.state(), SubscriptionState::Idle);
    h.controller.subscribe().await.expect("subscribe");
    assert_eq!(h.controller.state(), SubscriptionState::Subscribed);

    h.events.send(message("bad")).await.expect("send");
    h.events.send(message("good")).await.expect("send");
    h.events.send(TransportEvent::Closed).await.expect("send");

    let outcome = h.controller.run(h.shutdown.clone()).await.expect("run");
    assert_eq!(outcome, SubscriptionOutcome::RemoteClosed);
    assert_eq!(h.controller.state(), SubscriptionState::Closed);
    assert_eq!(*h.handler.received.lock().await, vec!["bad", "good"]);
}

#[tokio::test]
async fn stream_errors_keep_subscription_open() {
    let mut h = harness(false);
    h.controller.subscribe().await.expect("subscribe");
    let action = h
        .controller
        .on_stream_error(&IngestError::Transport("connection reset".to_string()));
    assert_eq!(action, StreamErrorAction::KeepOpen);

    h.events
        .send(TransportEvent::Error(IngestError::Transport(
            "connection reset".to_string(),
        )))
        .await
        .expect("send");
    h.events.send(message("after-error")).await.expect("send");
    h.events.send(message("stop")).await.expect("send");

    let outcome = h.controller.run(h.shutdown.clone()).await.expect("run");
    assert_eq!(outcome, SubscriptionOutcome::Interrupted);
    assert_eq!(*h.handler.received.lock().await, vec!["after-error", "stop"]);
    assert!(h.closed.load(Ordering::SeqCst));
    assert_eq!(h.controller.state(), SubscriptionState::Closed);
}

#[tokio::test]
async fn close_action_ends_subscription_on_stream_error() {
    let mut h = harness(false);
    h.controller = h.controller.with_stream_error_action(StreamErrorAction::Close);
    h.controller.subscribe().await.expect("subscribe");
    h.events
        .send(TransportEvent::Error(IngestError::Transport("reset".to_string())))
        .await
        .expect("send");

    let outcome = h.controller.run(h.shutdown.clone()).await.expect("run");
    assert_eq!(outcome, SubscriptionOutcome::ClosedOnError);
    assert!(h.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unauthorized_subscribe_is_fatal() {
    let mut h = harness(true);
    let err = h.controller.subscribe().await.expect_err("unauthorized");
    assert!(matches!(err, IngestError::Unauthorized(_)));
    assert!(err.is_fatal());
    assert_eq!(h.controller.state(), SubscriptionState::Failed);
}

#[tokio::test]
async fn unauthorized_while_receiving_fails_subscription() {
    let mut h = harness(false);
    h.controller.subscribe().await.expect("subscribe");
    h.events
        .send(TransportEvent::Error(IngestError::Unauthorized(
            "telemetry/topic".to_string(),
        )))
        .await
        .expect("send");

    let err = h
        .controller
        .run(h.shutdown.clone())
        .await
        .expect_err("fatal");
    assert!(err.is_fatal());
    assert_eq!(h.controller.state(), SubscriptionState::Failed);
    assert!(h.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn run_requires_subscription() {
    let mut h = harness(false);
    let err = h
        .controller
        .run(h.shutdown.clone())
        .await
        .expect_err("not subscribed");
    assert!(matches!(err, IngestError::NotSubscribed));
}

#[tokio::test]
async fn dropped_transport_counts_as_remote_close() {
    let mut h = harness(false);
    h.controller.subscribe().await.expect("subscribe");
    h.events.send(message("last")).await.expect("send");
    drop(h.events);

    let outcome = h.controller.run(h.shutdown.clone()).await.expect("run");
    assert_eq!(outcome, SubscriptionOutcome::RemoteClosed);
    assert_eq!(*h.handler.received.lock().await, vec!["last"]);
}

/// 统计 warn 级别事件数。
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn handler_failures_are_not_logged_again_at_warn() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut h = harness(false);
    h.controller.subscribe().await.expect("subscribe");
    h.events.send(message("bad")).await.expect("send");
    h.events.send(TransportEvent::Closed).await.expect("send");

    let outcome = h.controller.run(h.shutdown.clone()).await.expect("run");
    assert_eq!(outcome, SubscriptionOutcome::RemoteClosed);
    assert_eq!(*h.handler.received.lock().await, vec!["bad"]);
    assert_eq!(warnings.load(Ordering::SeqCst), 0);
}
