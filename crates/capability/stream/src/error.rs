//! 流服务错误类型

/// 流服务错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("stream not found: {0}")]
    NotFound(String),
    #[error("stream already exists: {0}")]
    AlreadyExists(String),
    #[error("stream full: {0}")]
    StreamFull(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("stream service unavailable: {0}")]
    Unavailable(String),
    #[error("stream backend error: {0}")]
    Backend(String),
}

impl StreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StreamError::NotFound(_))
    }

    /// 仅服务暂不可用时值得重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::Unavailable(_))
    }
}

impl From<redis::RedisError> for StreamError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
