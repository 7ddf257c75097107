use thiserror::Error;

/// 模型层统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown metric: '{0}'")]
    UnknownMetric(String),

    #[error("Unknown operator: '{0}'")]
    UnknownOperator(String),

    #[error("Unknown aggregate: '{0}'")]
    UnknownAggregate(String),

    #[error("Invalid reminder list: {0}")]
    InvalidReminderList(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ModelError>;
