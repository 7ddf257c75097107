use thiserror::Error;

/// 指标后端错误
///
/// 传输、状态码、超时、解析失败统一归为此类型，聚合器内部不重试。
#[derive(Error, Debug)]
pub enum MetricBackendError {
    #[error("Backend request failed: {0}")]
    Transport(String),

    #[error("Backend request timed out after {0} secs")]
    Timeout(u64),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, MetricBackendError>;

impl From<serde_json::Error> for MetricBackendError {
    fn from(err: serde_json::Error) -> Self {
        MetricBackendError::Decode(err.to_string())
    }
}
