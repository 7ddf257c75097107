use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::Metric;

/// 一个具名的指标查询
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesQuery {
    /// 返回结果中使用的名称
    pub name: String,
    pub metric: Metric,
}

impl SeriesQuery {
    /// 以指标规范名称作为查询名称
    pub fn new(metric: Metric) -> Self {
        Self {
            name: metric.name().to_string(),
            metric,
        }
    }

    pub fn named(name: impl Into<String>, metric: Metric) -> Self {
        Self {
            name: name.into(),
            metric,
        }
    }
}

/// 时间边界：绝对 epoch 秒或 Graphite 相对时间（如 "-1min"）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBound {
    Absolute(i64),
    Relative(String),
}

impl TimeBound {
    pub fn to_param(&self) -> String {
        match self {
            TimeBound::Absolute(ts) => ts.to_string(),
            TimeBound::Relative(expr) => expr.clone(),
        }
    }
}

impl From<DateTime<Utc>> for TimeBound {
    fn from(ts: DateTime<Utc>) -> Self {
        TimeBound::Absolute(ts.timestamp())
    }
}

/// 查询时间范围，未设置的一端由后端取默认值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<TimeBound>,
    pub until: Option<TimeBound>,
    /// 采样汇总间隔（秒）
    pub interval: Option<u64>,
}

impl TimeRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近 `secs` 秒
    pub fn last_secs(secs: u64) -> Self {
        Self {
            from: Some(TimeBound::Relative(format!("-{}s", secs))),
            until: None,
            interval: None,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            from: Some(start.into()),
            until: Some(end.into()),
            interval: None,
        }
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval = Some(secs);
        self
    }
}

/// 将指标翻译为 Graphite target 表达式
#[derive(Debug, Clone)]
pub struct TargetBuilder {
    machine_prefix: String,
}

impl TargetBuilder {
    pub fn new(machine_prefix: impl Into<String>) -> Self {
        Self {
            machine_prefix: machine_prefix.into(),
        }
    }

    /// 主机在 Graphite 中的路径前缀
    pub fn head(&self, uuid: &str) -> String {
        format!("{}-{}", self.machine_prefix, uuid)
    }

    /// 指标对应的原始 target
    pub fn inner_target(&self, uuid: &str, metric: &Metric) -> String {
        let head = self.head(uuid);
        match metric {
            Metric::Cpu => format!(
                "asPercent(derivative(sumSeries(exclude({head}.cpu-*.*,\"idle\"))),derivative(sumSeries({head}.cpu-*.*)))"
            ),
            Metric::Load => format!("{head}.load.load.shortterm"),
            Metric::Ram => format!(
                "asPercent(sumSeries({head}.memory.memory-{{buffered,cached,used}}),sumSeries({head}.memory.memory-*))"
            ),
            Metric::DiskRead => format!("derivative(sumSeries({head}.disk-*.disk_octets.read))"),
            Metric::DiskWrite => format!("derivative(sumSeries({head}.disk-*.disk_octets.write))"),
            Metric::NetworkRx => format!("derivative(sumSeries({head}.interface-*.if_octets.rx))"),
            Metric::NetworkTx => format!("derivative(sumSeries({head}.interface-*.if_octets.tx))"),
            // 有数据为 0，无数据为 1；主机未知时后端不返回任何序列
            Metric::NoData => format!("offset(scale(isNonNull({head}.load.load.shortterm),-1),1)"),
            Metric::Custom(target) => target.clone(),
        }
    }

    /// 带汇总和别名的完整 target
    pub fn target(&self, uuid: &str, metric: &Metric, interval: Option<u64>, alias: &str) -> String {
        let mut target = self.inner_target(uuid, metric);
        if let Some(secs) = interval {
            target = format!("summarize({},\"{}s\",\"avg\")", target, secs);
        }
        format!("alias({},'{}')", target, alias)
    }
}

impl Default for TargetBuilder {
    fn default() -> Self {
        Self::new("collectd")
    }
}
