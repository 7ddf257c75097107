use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{Condition, Machine, RuleSpec};
use vigil_series::{SeriesData, StatsGroup, StatsWindow};

use crate::error::ApiError;

/// 注册主机请求
#[derive(Debug, Deserialize)]
pub struct AddMachineRequest {
    pub uuid: Option<String>,
    pub collectd_password: Option<String>,
}

/// 创建或更新规则请求
#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub metric: Option<String>,
    pub operator: Option<String>,
    pub value: Option<f64>,
    #[serde(default)]
    pub aggregate: Option<String>,
    #[serde(default)]
    pub reminder_list: Option<Vec<u64>>,
    #[serde(default)]
    pub reminder_offset: Option<i64>,
}

impl TryFrom<UpdateRuleRequest> for RuleSpec {
    type Error = ApiError;

    fn try_from(req: UpdateRuleRequest) -> Result<Self, Self::Error> {
        let missing = |name: &str| ApiError::BadRequest(format!("missing parameter '{}'", name));

        Ok(RuleSpec {
            metric: req.metric.ok_or_else(|| missing("metric"))?,
            operator: req.operator.ok_or_else(|| missing("operator"))?,
            value: req.value.ok_or_else(|| missing("value"))?,
            aggregate: req.aggregate,
            reminder_list: req.reminder_list,
            reminder_offset: req.reminder_offset,
        })
    }
}

/// 条件响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ConditionResponse {
    pub cond_id: String,
    pub rule_id: String,
    pub metric: String,
    pub operator: String,
    pub value: f64,
    pub aggregate: String,
    pub active_after: DateTime<Utc>,
    pub state: bool,
    pub state_since: DateTime<Utc>,
    pub notification_level: usize,
    pub reminder_list: Option<Vec<u64>>,
    pub reminder_offset: i64,
}

impl From<Condition> for ConditionResponse {
    fn from(c: Condition) -> Self {
        Self {
            cond_id: c.cond_id,
            rule_id: c.rule_id,
            metric: c.metric,
            operator: c.operator,
            value: c.value,
            aggregate: c.aggregate,
            active_after: c.active_after,
            state: c.state,
            state_since: c.state_since,
            notification_level: c.notification_level,
            reminder_list: c.reminder_list,
            reminder_offset: c.reminder_offset,
        }
    }
}

/// 规则响应，条件记录缺失时 condition 为空
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleResponse {
    pub rule_id: String,
    pub condition_ref: String,
    pub condition: Option<ConditionResponse>,
}

/// 主机响应（不含密钥）
#[derive(Debug, Serialize, Deserialize)]
pub struct MachineResponse {
    pub uuid: String,
    pub activated: bool,
    pub enabled_time: DateTime<Utc>,
    pub rules: Vec<RuleResponse>,
}

impl MachineResponse {
    pub fn new(machine: &Machine, rules: Vec<RuleResponse>) -> Self {
        Self {
            uuid: machine.uuid.clone(),
            activated: machine.activated,
            enabled_time: machine.enabled_time,
            rules,
        }
    }
}

/// 统计查询参数，`step` 以毫秒给出
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub expression: Option<String>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<u64>,
}

/// 统计查询响应
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uuid: String,
    pub groups: Vec<StatsGroup>,
    #[serde(flatten)]
    pub window: StatsWindow,
    pub series: SeriesData,
}
