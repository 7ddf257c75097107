use crate::message::RuleNotification;
use anyhow::Result;
use async_trait::async_trait;

/// 一次投递的结果
///
/// 只有 `success` 为真时调用方才推进通知进度。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyResult {
    pub success: bool,
    /// 接收方返回的 HTTP 状态码（若有）
    pub status: Option<u16>,
    pub message: String,
}

impl NotifyResult {
    pub fn success() -> Self {
        Self {
            success: true,
            status: None,
            message: "delivered".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            message: message.into(),
        }
    }

    /// 接收方以非 2xx 状态拒绝
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some(status),
            message: body.into(),
        }
    }
}

/// 规则状态通知的投递端
///
/// 传输层错误返回 `Err`，接收方拒绝返回 `Ok(NotifyResult { success: false, .. })`。
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &RuleNotification) -> Result<NotifyResult>;

    fn name(&self) -> &str;
}
