use thiserror::Error;
use vigil_series::MetricBackendError;
use vigil_store::StoreError;

/// 单台主机求值失败的原因
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Metric backend error: {0}")]
    Backend(#[from] MetricBackendError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Evaluation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Evaluation task panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, AlertError>;
