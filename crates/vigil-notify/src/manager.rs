use crate::message::RuleNotification;
use crate::notifier::Notifier;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 通知管理器
///
/// 把传输错误、超时和失败结果统一折叠为 `false`，调用方只根据返回值
/// 决定是否推进通知进度。
pub struct NotifyManager {
    notifier: Arc<dyn Notifier>,
    timeout: Option<Duration>,
}

impl NotifyManager {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            timeout: None,
        }
    }

    /// 为每次发送再加一层超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn notifier_name(&self) -> &str {
        self.notifier.name()
    }

    /// 发送通知，core 接受时返回 true
    pub async fn deliver(&self, notification: &RuleNotification) -> bool {
        let send = self.notifier.send(notification);
        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, send).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow::anyhow!("timed out after {:?}", timeout)),
            },
            None => send.await,
        };

        match outcome {
            Ok(result) if result.success => {
                info!(
                    notifier = self.notifier.name(),
                    machine = %notification.machine_uuid,
                    rule_id = %notification.rule_id,
                    kind = notification.kind(),
                    value = notification.value,
                    level = notification.notification_level,
                    "Notification sent"
                );
                true
            }
            Ok(result) => {
                error!(
                    notifier = self.notifier.name(),
                    machine = %notification.machine_uuid,
                    rule_id = %notification.rule_id,
                    status = ?result.status,
                    reason = %result.message,
                    "Notification rejected"
                );
                false
            }
            Err(e) => {
                error!(
                    notifier = self.notifier.name(),
                    machine = %notification.machine_uuid,
                    rule_id = %notification.rule_id,
                    error = %e,
                    "Notification error"
                );
                false
            }
        }
    }
}
