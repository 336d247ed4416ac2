//! 入站报文 -> TelemetryRecord 的校验与规范化。
//!
//! 报文为 UTF-8 JSON 对象，必须包含 `timestamp`、`alias`、`value`、`quality` 四个键，
//! 其余键忽略。

use domain::{EventTimestamp, Quality, TelemetryRecord};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
const NANOS_DIGITS: usize = 9;

/// 规范化错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown quality: {0}")]
    UnknownQuality(String),
}

/// 报文规范化器，无状态。
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// 解析并校验原始报文。
    pub fn normalize(&self, payload: &[u8]) -> Result<TelemetryRecord, NormalizeError> {
        let text = std::str::from_utf8(payload)
            .map_err(|err| NormalizeError::InvalidPayload(err.to_string()))?;
        let json: Value = serde_json::from_str(text)
            .map_err(|err| NormalizeError::InvalidPayload(err.to_string()))?;
        let Value::Object(fields) = json else {
            return Err(NormalizeError::InvalidPayload(
                "expected a JSON object".to_string(),
            ));
        };

        let timestamp = parse_timestamp(required(&fields, "timestamp")?)?;
        let alias = parse_alias(required(&fields, "alias")?)?;
        let value = parse_value(required(&fields, "value")?)?;
        let quality = match required(&fields, "quality")? {
            Value::String(raw) => normalize_quality(raw)?,
            other => {
                return Err(NormalizeError::InvalidField {
                    field: "quality",
                    reason: format!("expected string, got {}", other),
                });
            }
        };

        Ok(TelemetryRecord {
            alias,
            timestamp,
            value,
            quality,
        })
    }
}

/// 大小写与重音不敏感地匹配 quality 枚举。
pub fn normalize_quality(raw: &str) -> Result<Quality, NormalizeError> {
    match caseless(raw).as_str() {
        "good" => Ok(Quality::Good),
        "bad" => Ok(Quality::Bad),
        "uncertain" => Ok(Quality::Uncertain),
        _ => Err(NormalizeError::UnknownQuality(raw.to_string())),
    }
}

/// 解析十进制 epoch 秒。
///
/// 纯十进制写法按位解析：整数位即秒，小数位精确换算为纳秒（超过 9 位的部分丢弃）。
/// 指数等其它写法走浮点解析，秒向零截断。
pub fn parse_epoch_seconds(text: &str) -> Result<EventTimestamp, NormalizeError> {
    let text = text.trim();
    if let Some((integer, fraction)) = split_decimal(text) {
        let seconds = match integer {
            "" => 0,
            digits => digits
                .parse::<i64>()
                .map_err(|_| invalid("timestamp", "out of range"))?,
        };
        return Ok(EventTimestamp::new(seconds, fraction_nanos(fraction)));
    }

    let seconds = text
        .parse::<f64>()
        .map_err(|err| invalid("timestamp", err.to_string()))?;
    if !seconds.is_finite() {
        return Err(invalid("timestamp", "not a finite number"));
    }
    if seconds < 0.0 {
        return Err(invalid("timestamp", "must not be negative"));
    }
    if seconds >= i64::MAX as f64 {
        return Err(invalid("timestamp", "out of range"));
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * NANOS_PER_SECOND)
        .round()
        .min(NANOS_PER_SECOND - 1.0) as u32;
    Ok(EventTimestamp::new(whole as i64, nanos))
}

fn required<'a>(
    fields: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Value, NormalizeError> {
    match fields.get(key) {
        Some(Value::Null) | None => Err(NormalizeError::MissingField(key)),
        Some(value) => Ok(value),
    }
}

fn parse_timestamp(value: &Value) -> Result<EventTimestamp, NormalizeError> {
    match value {
        Value::String(text) => parse_epoch_seconds(text),
        Value::Number(number) => parse_epoch_seconds(&number.to_string()),
        other => Err(invalid(
            "timestamp",
            format!("expected decimal epoch seconds, got {}", other),
        )),
    }
}

fn parse_alias(value: &Value) -> Result<String, NormalizeError> {
    match value {
        Value::String(alias) if !alias.trim().is_empty() => Ok(alias.clone()),
        Value::String(_) => Err(invalid("alias", "must not be empty")),
        other => Err(invalid("alias", format!("expected string, got {}", other))),
    }
}

fn parse_value(value: &Value) -> Result<f64, NormalizeError> {
    let parsed = match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| invalid("value", "not representable as float64"))?,
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| invalid("value", err.to_string()))?,
        other => return Err(invalid("value", format!("expected number, got {}", other))),
    };
    if !parsed.is_finite() {
        return Err(invalid("value", "not a finite number"));
    }
    Ok(parsed)
}

/// `123`、`123.456`、`.5` 这类纯十进制写法拆成整数位与小数位，其它写法返回 None。
fn split_decimal(text: &str) -> Option<(&str, &str)> {
    let (integer, fraction) = text.split_once('.').unwrap_or((text, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if integer.len() + fraction.len() == 0 || !all_digits(integer) || !all_digits(fraction) {
        return None;
    }
    Some((integer, fraction))
}

/// 小数位取前 9 位，不足补零。
fn fraction_nanos(fraction: &str) -> u32 {
    fraction
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(NANOS_DIGITS)
        .fold(0, |nanos, digit| nanos * 10 + u32::from(digit - b'0'))
}

fn caseless(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn invalid(field: &'static str, reason: impl Into<String>) -> NormalizeError {
    NormalizeError::InvalidField {
        field,
        reason: reason.into(),
    }
}
