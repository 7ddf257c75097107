use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 规则状态通知
///
/// 触发、提醒和恢复都使用同一种消息，由 `triggered` 区分。
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleNotification {
    pub machine_uuid: String,
    pub machine_password: String,
    pub rule_id: String,
    /// 展示值（吞吐类指标已换算为 KB/s）
    pub value: f64,
    pub triggered: bool,
    /// 最近一次状态切换时间
    pub since: DateTime<Utc>,
    pub notification_level: usize,
}

impl RuleNotification {
    /// core 接口的查询参数
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("machine_uuid", self.machine_uuid.clone()),
            ("machine_password", self.machine_password.clone()),
            ("rule_id", self.rule_id.clone()),
            ("value", self.value.to_string()),
            ("triggered", u8::from(self.triggered).to_string()),
            ("since", self.since.timestamp().to_string()),
            ("notification_level", self.notification_level.to_string()),
        ]
    }

    pub fn kind(&self) -> &'static str {
        if self.triggered {
            "WARNING"
        } else {
            "OK"
        }
    }
}

// 不输出密钥
impl fmt::Debug for RuleNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleNotification")
            .field("machine_uuid", &self.machine_uuid)
            .field("rule_id", &self.rule_id)
            .field("value", &self.value)
            .field("triggered", &self.triggered)
            .field("since", &self.since)
            .field("notification_level", &self.notification_level)
            .finish()
    }
}
