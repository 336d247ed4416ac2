//! MQTT topic → 时序流桥接进程。
//!
//! 启动顺序：加载配置 → 重建流 → 订阅 topic → 接收直到关停信号。
//! 启动阶段任何错误都以退出码 1 结束进程。

mod handler;

use clap::Parser;
use domain::{SiteWiseExportConfig, StreamDefinition};
use ems_config::{BridgeConfig, StreamBackend};
use ems_ingest::{MqttTransport, MqttTransportConfig, SubscriptionController, SubscriptionOutcome};
use ems_normalize::Normalizer;
use ems_pipeline::{BridgePipeline, EntryBuilder, Forwarder, RetryPolicy};
use ems_stream::{InMemoryStreamService, RedisStreamService, StreamProvisioner, StreamService};
use ems_telemetry::{init_tracing, metrics};
use handler::BridgeHandler;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const MQTT_KEEP_ALIVE_SECS: u64 = 30;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 订阅 topic 并把遥测报文写入指定流。
#[derive(Debug, Parser)]
#[command(name = "ems-bridge", version)]
struct Cli {
    /// 订阅的 topic
    topic: String,
    /// 目标流名称
    stream_name: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help / --version 正常退出，其余参数错误退出码 1
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "ems.bridge", error = ?err, "bridge_failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_env(cli.topic, cli.stream_name)?;
    info!(
        target: "ems.bridge",
        topic = %config.topic,
        stream = %config.stream_name,
        backend = ?config.stream_backend,
        precision = ?config.timestamp_precision,
        "bridge_starting"
    );

    let service = stream_service(&config)?;

    // 每次启动都重建流，丢弃上一次运行残留的数据
    let definition = StreamDefinition::overwrite_oldest(
        config.stream_name.clone(),
        config.stream_max_messages,
        SiteWiseExportConfig {
            identifier: config.export_identifier.clone(),
            batch_size: config.export_batch_size,
        },
    );
    StreamProvisioner::new(service.clone())
        .provision(&definition)
        .await?;

    let forwarder = Forwarder::new(service, config.stream_name.clone()).with_retry(RetryPolicy {
        max_retries: config.forward_max_retries,
        backoff_ms: config.forward_backoff_ms,
    });
    let pipeline = BridgePipeline::new(
        Normalizer::new(),
        EntryBuilder::new(config.timestamp_precision),
        forwarder,
    );
    let handler = Arc::new(BridgeHandler::new(pipeline));
    let transport = Arc::new(MqttTransport::new(mqtt_config(&config)));
    let mut controller = SubscriptionController::new(transport, handler, config.topic.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    controller.subscribe().await?;
    let outcome = controller.run(shutdown.clone()).await?;
    if outcome != SubscriptionOutcome::Interrupted {
        // 订阅已结束但不自动重订阅，进程等待关停信号后正常退出
        info!(target: "ems.bridge", outcome = ?outcome, "waiting_for_shutdown");
        shutdown.cancelled().await;
    }

    let snapshot = metrics().snapshot();
    info!(
        target: "ems.bridge",
        messages_received = snapshot.messages_received,
        records_normalized = snapshot.records_normalized,
        records_rejected = snapshot.records_rejected,
        entries_appended = snapshot.entries_appended,
        append_failures = snapshot.append_failures,
        append_retries = snapshot.append_retries,
        transport_errors = snapshot.transport_errors,
        "bridge_stopped"
    );
    Ok(())
}

fn stream_service(
    config: &BridgeConfig,
) -> Result<Arc<dyn StreamService>, Box<dyn std::error::Error>> {
    let service: Arc<dyn StreamService> = match config.stream_backend {
        StreamBackend::Memory => Arc::new(InMemoryStreamService::new()),
        StreamBackend::Redis => Arc::new(RedisStreamService::connect(&config.redis_url)?),
    };
    Ok(service)
}

fn mqtt_config(config: &BridgeConfig) -> MqttTransportConfig {
    MqttTransportConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        client_id: config.mqtt_client_id.clone(),
        qos: config.mqtt_qos,
        keep_alive_secs: MQTT_KEEP_ALIVE_SECS,
        channel_capacity: EVENT_CHANNEL_CAPACITY,
    }
}

/// 等待 Ctrl-C 或 SIGTERM 后取消 token。
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "ems.bridge", error = %err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "ems.bridge", error = %err, "sigterm_listener_failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(target: "ems.bridge", "shutdown_signal_received");
    shutdown.cancel();
}
