use thiserror::Error;
use vigil_core::ModelError;

/// 存储层错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 主机未找到
    #[error("Machine not found: {0}")]
    MachineNotFound(String),

    /// 主机已存在
    #[error("Machine already exists: {0}")]
    MachineExists(String),

    /// 规则未找到
    #[error("Rule {rule_id} not found on machine {uuid}")]
    RuleNotFound { uuid: String, rule_id: String },

    /// 规则引用的条件记录不存在
    #[error("Condition {cond_id} of rule {rule_id} on machine {uuid} not found")]
    ConditionNotFound {
        uuid: String,
        rule_id: String,
        cond_id: String,
    },

    /// 等待主机锁超时
    #[error("Timed out after {waited_ms} ms waiting for lock on machine {uuid}")]
    LockTimeout { uuid: String, waited_ms: u64 },

    /// 保存时已不再持有主机锁
    #[error("Lock on machine {0} is not held")]
    LockLost(String),

    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(#[from] ModelError),

    /// 快照读写错误
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 存储层结果类型
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn rule_not_found(uuid: impl Into<String>, rule_id: impl Into<String>) -> Self {
        StoreError::RuleNotFound {
            uuid: uuid.into(),
            rule_id: rule_id.into(),
        }
    }

    /// 是否属于"记录不存在"一类
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::MachineNotFound(_)
                | StoreError::RuleNotFound { .. }
                | StoreError::ConditionNotFound { .. }
        )
    }
}
