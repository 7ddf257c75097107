use crate::query::{SeriesQuery, TimeRange};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use tracing::warn;
use vigil_core::{Metric, ModelError};

/// 默认步长（毫秒）
pub const DEFAULT_STEP_MS: u64 = 10_000;

/// 主机图表的指标组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsGroup {
    Cpu,
    Load,
    Memory,
    Disk,
    Network,
}

impl StatsGroup {
    pub const ALL: [StatsGroup; 5] = [
        StatsGroup::Cpu,
        StatsGroup::Load,
        StatsGroup::Memory,
        StatsGroup::Disk,
        StatsGroup::Network,
    ];

    /// 组内的具名查询
    pub fn queries(&self) -> Vec<SeriesQuery> {
        match self {
            StatsGroup::Cpu => vec![SeriesQuery::new(Metric::Cpu)],
            StatsGroup::Load => vec![SeriesQuery::new(Metric::Load)],
            StatsGroup::Memory => vec![SeriesQuery::named("memory", Metric::Ram)],
            StatsGroup::Disk => vec![
                SeriesQuery::new(Metric::DiskRead),
                SeriesQuery::new(Metric::DiskWrite),
            ],
            StatsGroup::Network => vec![
                SeriesQuery::new(Metric::NetworkRx),
                SeriesQuery::new(Metric::NetworkTx),
            ],
        }
    }

    /// 解析逗号分隔的组列表，空或缺省时返回全部
    pub fn parse_list(expression: Option<&str>) -> Result<Vec<StatsGroup>, ModelError> {
        let Some(expression) = expression.map(str::trim).filter(|e| !e.is_empty()) else {
            return Ok(Self::ALL.to_vec());
        };

        let mut groups = Vec::new();
        for part in expression.split(',') {
            let group: StatsGroup = part.parse()?;
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        Ok(groups)
    }
}

impl FromStr for StatsGroup {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cpu" => Ok(StatsGroup::Cpu),
            "load" => Ok(StatsGroup::Load),
            "memory" => Ok(StatsGroup::Memory),
            "disk" => Ok(StatsGroup::Disk),
            "network" => Ok(StatsGroup::Network),
            other => Err(ModelError::InvalidInput(format!(
                "unknown stats expression '{}'",
                other
            ))),
        }
    }
}

/// 图表查询的时间窗口，单位秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsWindow {
    pub start: i64,
    pub stop: i64,
    pub step: u64,
}

impl StatsWindow {
    /// 由请求参数构造窗口
    ///
    /// `step` 以毫秒给出：不小于 5000 时换算为秒，0 取 60 秒，
    /// 其余值按秒处理。`stop` 缺省为当前时间，`start` 缺省为 `stop - step`。
    pub fn from_params(
        start: Option<i64>,
        stop: Option<i64>,
        step_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        let step = match step_ms.unwrap_or(DEFAULT_STEP_MS) {
            0 => {
                warn!("Stats step is 0, using 60 seconds");
                60
            }
            ms if ms >= 5000 => ms / 1000,
            secs => {
                warn!(step = secs, "Stats step below 5000, treating it as seconds");
                secs
            }
        };

        let stop = stop.unwrap_or_else(|| now.timestamp());
        let step_secs = i64::try_from(step)
            .map_err(|_| ModelError::InvalidInput(format!("step out of range: {}", step)))?;
        let start = match start {
            Some(start) => start,
            None => stop.checked_sub(step_secs).ok_or_else(|| {
                ModelError::InvalidInput(format!("stop out of range: {}", stop))
            })?,
        };

        if start >= stop {
            return Err(ModelError::InvalidInput(format!(
                "start ({}) must be before stop ({})",
                start, stop
            )));
        }

        Ok(Self { start, stop, step })
    }

    /// 对应的查询范围，按步长汇总
    pub fn range(&self) -> Result<TimeRange, ModelError> {
        let start = DateTime::from_timestamp(self.start, 0)
            .ok_or_else(|| ModelError::InvalidInput(format!("start out of range: {}", self.start)))?;
        let stop = DateTime::from_timestamp(self.stop, 0)
            .ok_or_else(|| ModelError::InvalidInput(format!("stop out of range: {}", self.stop)))?;
        Ok(TimeRange::between(start, stop).with_interval(self.step))
    }
}

/// 多个组合并后的查询列表
pub fn stats_queries(groups: &[StatsGroup]) -> Vec<SeriesQuery> {
    groups.iter().flat_map(StatsGroup::queries).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeBound;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_parse_groups() {
        assert_eq!(StatsGroup::parse_list(None).unwrap(), StatsGroup::ALL.to_vec());
        assert_eq!(StatsGroup::parse_list(Some(" ")).unwrap().len(), 5);
        assert_eq!(
            StatsGroup::parse_list(Some("load,disk,load")).unwrap(),
            vec![StatsGroup::Load, StatsGroup::Disk]
        );
        assert!(StatsGroup::parse_list(Some("cpu,gpu")).is_err());
    }

    #[test]
    fn test_queries_per_group() {
        let names: Vec<String> = stats_queries(&[StatsGroup::Memory, StatsGroup::Network])
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(names, vec!["memory", "network-rx", "network-tx"]);
    }

    #[test]
    fn test_window_defaults() {
        let window = StatsWindow::from_params(None, None, None, now()).unwrap();
        assert_eq!(window.step, 10);
        assert_eq!(window.stop, 1_700_000_000);
        assert_eq!(window.start, 1_700_000_000 - 10);
    }

    #[test]
    fn test_window_step_units() {
        let ms = StatsWindow::from_params(Some(0), Some(3600), Some(60_000), now()).unwrap();
        assert_eq!(ms.step, 60);

        let zero = StatsWindow::from_params(Some(0), Some(3600), Some(0), now()).unwrap();
        assert_eq!(zero.step, 60);

        let secs = StatsWindow::from_params(Some(0), Some(3600), Some(30), now()).unwrap();
        assert_eq!(secs.step, 30);
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(StatsWindow::from_params(Some(100), Some(100), None, now()).is_err());
        assert!(StatsWindow::from_params(Some(200), Some(100), None, now()).is_err());
    }

    #[test]
    fn test_window_range_is_absolute() {
        let window = StatsWindow::from_params(Some(1000), Some(2000), Some(60_000), now()).unwrap();
        let range = window.range().unwrap();
        assert_eq!(range.from, Some(TimeBound::Absolute(1000)));
        assert_eq!(range.until, Some(TimeBound::Absolute(2000)));
        assert_eq!(range.interval, Some(60));
    }
}
