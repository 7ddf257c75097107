use crate::compute::{compute, Evaluation};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use vigil_core::{Aggregate, Condition, Machine, Metric, Operator, DEFAULT_REMINDER_LIST};
use vigil_notify::{NotifyManager, RuleNotification};
use vigil_series::{SeriesAggregator, SeriesQuery, TimeRange};
use vigil_store::ConditionStore;

/// 求值参数
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// 主机激活后条件的静默期
    pub grace_period: Duration,
    /// 条件未设置提醒列表时使用
    pub reminder_list: Vec<u64>,
    /// 查询窗口（秒）
    pub lookback_secs: u64,
    /// 采样汇总间隔（秒）
    pub interval_secs: Option<u64>,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::seconds(60),
            reminder_list: DEFAULT_REMINDER_LIST.to_vec(),
            lookback_secs: 60,
            interval_secs: None,
        }
    }
}

impl EvaluatorSettings {
    fn range(&self) -> TimeRange {
        let range = TimeRange::last_secs(self.lookback_secs);
        match self.interval_secs {
            Some(secs) => range.with_interval(secs),
            None => range,
        }
    }
}

/// 单台主机一次求值的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MachineReport {
    pub uuid: String,
    /// 本轮完成了激活
    pub activated: bool,
    pub evaluated: usize,
    pub skipped: usize,
    pub notified: usize,
    pub failed_notifications: usize,
}

/// 待求值的条件
struct Pending {
    condition: Condition,
    metric: Metric,
    operator: Operator,
    aggregate: Aggregate,
}

/// 告警求值器
pub struct AlertEvaluator {
    store: Arc<dyn ConditionStore>,
    series: Arc<SeriesAggregator>,
    notify: Arc<NotifyManager>,
    settings: EvaluatorSettings,
}

impl AlertEvaluator {
    pub fn new(
        store: Arc<dyn ConditionStore>,
        series: Arc<SeriesAggregator>,
        notify: Arc<NotifyManager>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            store,
            series,
            notify,
            settings,
        }
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    pub async fn check_machine(&self, machine: &Machine) -> Result<MachineReport> {
        self.check_machine_at(machine, Utc::now()).await
    }

    /// 以给定时间对一台主机求值
    ///
    /// 后端查询失败时整台主机本轮放弃，不修改任何状态。
    pub async fn check_machine_at(
        &self,
        machine: &Machine,
        now: DateTime<Utc>,
    ) -> Result<MachineReport> {
        let mut report = MachineReport {
            uuid: machine.uuid.clone(),
            ..Default::default()
        };

        if !machine.activated {
            report.activated = self.activate_if_live(machine, now).await?;
            return Ok(report);
        }

        debug!(machine = %machine.uuid, rules = machine.rules.len(), "Checking machine");

        let pending = self.collect(machine, now, &mut report).await?;
        if pending.is_empty() {
            return Ok(report);
        }

        // 同一规范名称只查询一次
        let mut seen = HashSet::new();
        let queries: Vec<SeriesQuery> = pending
            .iter()
            .filter(|p| seen.insert(p.metric.name().to_string()))
            .map(|p| SeriesQuery::new(p.metric.clone()))
            .collect();

        let data = self
            .series
            .fetch(&machine.uuid, &queries, &self.settings.range())
            .await?;

        for item in pending {
            let samples: Vec<f64> = data
                .get(item.metric.name())
                .map(|points| points.iter().map(|p| p.value).collect())
                .unwrap_or_default();

            let samples = if samples.is_empty() && item.metric == Metric::NoData {
                // 后端完全没有该主机的数据，视为无数据
                vec![1.0]
            } else {
                samples
            };

            let Some(evaluation) =
                compute(item.operator, item.aggregate, item.condition.value, &samples)
            else {
                warn!(
                    machine = %machine.uuid,
                    rule_id = %item.condition.rule_id,
                    condition = %item.condition,
                    "No data for rule"
                );
                report.skipped += 1;
                continue;
            };

            report.evaluated += 1;
            self.apply(machine, item, evaluation, now, &mut report)
                .await?;
        }

        info!(
            machine = %machine.uuid,
            evaluated = report.evaluated,
            skipped = report.skipped,
            notified = report.notified,
            failed_notifications = report.failed_notifications,
            "Machine checked"
        );

        Ok(report)
    }

    /// 未激活主机只做存活探测，有实时数据时激活
    async fn activate_if_live(&self, machine: &Machine, now: DateTime<Utc>) -> Result<bool> {
        let data = self
            .series
            .fetch(
                &machine.uuid,
                &[SeriesQuery::new(Metric::NoData)],
                &self.settings.range(),
            )
            .await?;

        let live = data
            .get(Metric::NoData.name())
            .is_some_and(|points| points.iter().any(|p| p.value == 0.0));
        if !live {
            debug!(machine = %machine.uuid, "Machine not reporting yet");
            return Ok(false);
        }

        let mut lease = self.store.lock_machine(&machine.uuid).await?;
        if lease.activated {
            return Ok(false);
        }

        lease.activated = true;
        lease.enabled_time = now;
        let active_after = now + self.settings.grace_period;

        let rule_ids: Vec<String> = lease.rules.keys().cloned().collect();
        for rule_id in rule_ids {
            match self.store.get_condition(lease.machine(), &rule_id).await {
                Ok(mut condition) => {
                    condition.active_after = active_after;
                    self.write_back(machine, &condition).await?;
                }
                Err(e) if e.is_not_found() => {
                    warn!(machine = %machine.uuid, rule_id = %rule_id, error = %e, "Skipping rule during activation");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.store.save_machine(&lease).await?;

        info!(
            machine = %machine.uuid,
            active_after = %active_after,
            "Machine activated"
        );
        Ok(true)
    }

    /// 收集可求值的条件，跳过缺失、配置错误和未生效的条件
    async fn collect(
        &self,
        machine: &Machine,
        now: DateTime<Utc>,
        report: &mut MachineReport,
    ) -> Result<Vec<Pending>> {
        let mut pending = Vec::with_capacity(machine.rules.len());

        for rule_id in machine.rules.keys() {
            let condition = match self.store.get_condition(machine, rule_id).await {
                Ok(condition) => condition,
                Err(e) if e.is_not_found() => {
                    warn!(
                        machine = %machine.uuid,
                        rule_id = %rule_id,
                        error = %e,
                        "Condition not found, probably rule just got updated. Will check on next run"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let parsed = condition.parsed_metric().and_then(|metric| {
                Ok((
                    metric,
                    condition.parsed_operator()?,
                    condition.parsed_aggregate()?,
                ))
            });
            let (metric, operator, aggregate) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(
                        machine = %machine.uuid,
                        rule_id = %rule_id,
                        condition = %condition,
                        error = %e,
                        "Invalid condition"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            if !condition.is_active(now) {
                debug!(
                    machine = %machine.uuid,
                    rule_id = %rule_id,
                    active_after = %condition.active_after,
                    "Condition not active yet"
                );
                report.skipped += 1;
                continue;
            }

            pending.push(Pending {
                condition,
                metric,
                operator,
                aggregate,
            });
        }

        Ok(pending)
    }

    /// 写入判定结果，按需发送通知
    async fn apply(
        &self,
        machine: &Machine,
        item: Pending,
        evaluation: Evaluation,
        now: DateTime<Utc>,
        report: &mut MachineReport,
    ) -> Result<()> {
        let mut condition = item.condition;

        if condition.transition(evaluation.triggered, now) {
            info!(
                machine = %machine.uuid,
                rule_id = %condition.rule_id,
                condition = %condition,
                state = condition.state,
                value = evaluation.value,
                level = condition.notification_level,
                "Condition state changed"
            );
            if !self.write_back(machine, &condition).await? {
                return Ok(());
            }
        }

        let reminder_due = condition.reminder_due(now, &self.settings.reminder_list);
        if !reminder_due && !condition.recovery_due() {
            return Ok(());
        }

        let notification = RuleNotification {
            machine_uuid: machine.uuid.clone(),
            machine_password: machine.collectd_password.clone(),
            rule_id: condition.rule_id.clone(),
            value: item.metric.display_value(evaluation.value),
            triggered: condition.state,
            since: condition.state_since,
            notification_level: condition.notification_level,
        };

        if !self.notify.deliver(&notification).await {
            // 进度不变，下一轮重试
            report.failed_notifications += 1;
            return Ok(());
        }

        condition.notification_level = if condition.state {
            condition.notification_level + 1
        } else {
            1
        };
        report.notified += 1;
        self.write_back(machine, &condition).await?;

        Ok(())
    }

    /// 写回条件；条件在求值期间被替换或删除时返回 `false`，不再写入
    async fn write_back(&self, machine: &Machine, condition: &Condition) -> Result<bool> {
        match self.store.update_condition(condition).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                info!(
                    machine = %machine.uuid,
                    rule_id = %condition.rule_id,
                    cond_id = %condition.cond_id,
                    "Condition replaced during evaluation, dropping result"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
