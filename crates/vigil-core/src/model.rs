use crate::error::{ModelError, Result};
use crate::metric::{Aggregate, Metric, Operator};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 未配置提醒列表时使用的进程级默认值（秒）
pub const DEFAULT_REMINDER_LIST: &[u64] = &[0, 60, 300, 600];

/// 被监控主机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// 主机 ID（主键）
    pub uuid: String,

    /// collectd 共享密钥，上报指标和通知 core 时用于认证
    pub collectd_password: String,

    /// 是否已经上报过实时数据
    #[serde(default)]
    pub activated: bool,

    /// 监控（重新）启用时间
    pub enabled_time: DateTime<Utc>,

    /// rule_id -> Rule
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
}

impl Machine {
    pub fn new(uuid: impl Into<String>, collectd_password: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            collectd_password: collectd_password.into(),
            activated: false,
            enabled_time: Utc::now(),
            rules: BTreeMap::new(),
        }
    }

    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.get(rule_id)
    }
}

/// 主机上的规则槽位，指向当前生效的条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    /// 当前条件的 cond_id
    pub condition_ref: String,
}

/// 创建或更新规则时提交的阈值定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub metric: String,
    pub operator: String,
    pub value: f64,
    #[serde(default)]
    pub aggregate: Option<String>,
    #[serde(default)]
    pub reminder_list: Option<Vec<u64>>,
    #[serde(default)]
    pub reminder_offset: Option<i64>,
}

impl RuleSpec {
    /// 校验指标、比较方式、聚合方式和提醒列表
    pub fn validate(&self) -> Result<()> {
        self.metric.parse::<Metric>()?;
        self.operator.parse::<Operator>()?;
        self.aggregate.as_deref().unwrap_or_default().parse::<Aggregate>()?;

        if !self.value.is_finite() {
            return Err(ModelError::InvalidInput(format!(
                "threshold must be a finite number, got {}",
                self.value
            )));
        }

        if let Some(list) = &self.reminder_list {
            if list.is_empty() {
                return Err(ModelError::InvalidReminderList("list is empty".to_string()));
            }
            if list.windows(2).any(|w| w[0] > w[1]) {
                return Err(ModelError::InvalidReminderList(format!(
                    "delays must be non-decreasing: {:?}",
                    list
                )));
            }
        }

        Ok(())
    }
}

/// 可求值的阈值定义及其求值状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// 条件 ID，与 rule_id 无关，便于更新时原子替换
    pub cond_id: String,
    /// 所属主机
    pub uuid: String,
    /// 所属规则
    pub rule_id: String,

    pub metric: String,
    pub operator: String,
    pub value: f64,
    #[serde(default)]
    pub aggregate: String,

    /// 在此之前忽略该条件
    pub active_after: DateTime<Utc>,

    /// 当前是否触发
    #[serde(default)]
    pub state: bool,
    /// 最近一次状态切换时间
    pub state_since: DateTime<Utc>,
    /// 已成功发送的通知进度，同时作为 reminder_list 下标
    #[serde(default)]
    pub notification_level: usize,

    /// None 表示使用进程级默认值
    #[serde(default)]
    pub reminder_list: Option<Vec<u64>>,
    #[serde(default)]
    pub reminder_offset: i64,
}

impl Condition {
    /// 根据规则定义创建新条件
    ///
    /// 新条件未触发且 notification_level 为 1，首次求值为正常时不会发送 OK。
    pub fn new(
        uuid: impl Into<String>,
        rule_id: impl Into<String>,
        spec: &RuleSpec,
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> Self {
        Self {
            cond_id: uuid::Uuid::new_v4().simple().to_string(),
            uuid: uuid.into(),
            rule_id: rule_id.into(),
            metric: spec.metric.clone(),
            operator: spec.operator.clone(),
            value: spec.value,
            aggregate: spec.aggregate.clone().unwrap_or_default(),
            active_after: now + grace_period,
            state: false,
            state_since: now,
            notification_level: 1,
            reminder_list: spec.reminder_list.clone(),
            reminder_offset: spec.reminder_offset.unwrap_or(0),
        }
    }

    pub fn parsed_metric(&self) -> Result<Metric> {
        self.metric.parse()
    }

    pub fn parsed_operator(&self) -> Result<Operator> {
        self.operator.parse()
    }

    pub fn parsed_aggregate(&self) -> Result<Aggregate> {
        self.aggregate.parse()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.active_after
    }

    /// 生效的提醒列表
    pub fn reminders<'a>(&'a self, default: &'a [u64]) -> &'a [u64] {
        self.reminder_list.as_deref().unwrap_or(default)
    }

    /// 写入新的触发状态，返回状态是否发生切换
    ///
    /// 进入触发态时进度归 0；恢复时若触发通知从未发出则置 1，
    /// 这样不会为从未上报过的告警发送 OK。
    pub fn transition(&mut self, triggered: bool, now: DateTime<Utc>) -> bool {
        if triggered == self.state {
            return false;
        }

        self.notification_level = if triggered {
            0
        } else if self.notification_level == 0 {
            1
        } else {
            0
        };
        self.state = triggered;
        self.state_since = now;
        true
    }

    /// 处于触发态且到达下一个提醒点
    pub fn reminder_due(&self, now: DateTime<Utc>, default: &[u64]) -> bool {
        if !self.state {
            return false;
        }
        let Some(&wait) = self.reminders(default).get(self.notification_level) else {
            return false;
        };
        let elapsed = (now - self.state_since).num_milliseconds() as f64 / 1000.0;
        let threshold = wait as f64 + self.reminder_offset as f64;
        elapsed >= threshold
    }

    /// 处于正常态且恢复通知尚未发出
    pub fn recovery_due(&self) -> bool {
        !self.state && self.notification_level == 0
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operator = self
            .parsed_operator()
            .map(|op| op.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let aggregate = if self.aggregate.is_empty() {
            "all"
        } else {
            self.aggregate.as_str()
        };
        write!(f, "{} {} {} ({})", self.metric, operator, self.value, aggregate)
    }
}
