//! 桥接进程运行配置加载。

use domain::TimestampPrecision;
use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 流服务后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamBackend {
    #[default]
    Memory,
    Redis,
}

/// 桥接进程运行配置。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub topic: String,
    pub stream_name: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_qos: u8,
    pub stream_backend: StreamBackend,
    pub redis_url: String,
    pub stream_max_messages: u64,
    pub export_identifier: String,
    pub export_batch_size: u32,
    pub timestamp_precision: TimestampPrecision,
    pub forward_max_retries: u64,
    pub forward_backoff_ms: u64,
}

impl BridgeConfig {
    /// 从环境变量读取配置；topic 与 stream_name 来自命令行。
    pub fn from_env(
        topic: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_source(topic, stream_name, |key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试时可替换环境变量）。
    pub fn from_source<F>(
        topic: impl Into<String>,
        stream_name: impl Into<String>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };
        let topic = required_arg("topic", topic.into())?;
        let stream_name = required_arg("stream_name", stream_name.into())?;

        let mqtt_host = source.string_with_default("EMS_MQTT_HOST", "127.0.0.1");
        let mqtt_port = source.parse_with_default("EMS_MQTT_PORT", 1883u16)?;
        let mqtt_username = source.optional("EMS_MQTT_USERNAME");
        let mqtt_password = source.optional("EMS_MQTT_PASSWORD");
        let mqtt_client_id = source
            .optional("EMS_MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("ems-bridge-{}", uuid::Uuid::new_v4()));
        let mqtt_qos = source.parse_with_default("EMS_MQTT_QOS", 1u8)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "EMS_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }
        let stream_backend = source.stream_backend("EMS_STREAM_BACKEND")?;
        let redis_url = source.string_with_default("EMS_REDIS_URL", "redis://127.0.0.1:6379");
        let stream_max_messages = source.positive_u64("EMS_STREAM_MAX_MESSAGES", 10_000)?;
        let export_identifier = source
            .optional("EMS_EXPORT_IDENTIFIER")
            .unwrap_or_else(|| format!("IoTSiteWiseExport{stream_name}"));
        let export_batch_size = source.parse_with_default("EMS_EXPORT_BATCH_SIZE", 5u32)?;
        if export_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "EMS_EXPORT_BATCH_SIZE".to_string(),
                "0".to_string(),
            ));
        }
        let timestamp_precision = source.timestamp_precision("EMS_TIMESTAMP_PRECISION")?;
        let forward_max_retries = source.parse_with_default("EMS_FORWARD_MAX_RETRIES", 0u64)?;
        let forward_backoff_ms = source.parse_with_default("EMS_FORWARD_BACKOFF_MS", 200u64)?;

        Ok(Self {
            topic,
            stream_name,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_qos,
            stream_backend,
            redis_url,
            stream_max_messages,
            export_identifier,
            export_batch_size,
            timestamp_precision,
            forward_max_retries,
            forward_backoff_ms,
        })
    }
}

fn required_arg(name: &str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name.to_string()));
    }
    Ok(value)
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 空字符串视为未设置。
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }

    fn string_with_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_with_default<T: std::str::FromStr>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(default);
        };
        value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }

    fn positive_u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.parse_with_default(key, default)? {
            0 => Err(ConfigError::Invalid(key.to_string(), "0".to_string())),
            value => Ok(value),
        }
    }

    fn stream_backend(&self, key: &str) -> Result<StreamBackend, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(StreamBackend::default());
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StreamBackend::Memory),
            "redis" => Ok(StreamBackend::Redis),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        }
    }

    fn timestamp_precision(&self, key: &str) -> Result<TimestampPrecision, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(TimestampPrecision::default());
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "nanos" => Ok(TimestampPrecision::Nanos),
            "seconds" => Ok(TimestampPrecision::Seconds),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        }
    }
}
