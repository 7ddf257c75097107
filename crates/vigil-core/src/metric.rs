use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 规则可引用的指标
///
/// 除固定集合外，任意后端原生 target 字符串以 `Custom` 表示。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Cpu,
    Load,
    Ram,
    DiskRead,
    DiskWrite,
    NetworkRx,
    NetworkTx,
    /// 存活检测：0 表示有数据，1 表示无数据
    NoData,
    Custom(String),
}

impl Metric {
    /// 规范名称，同一规范名称的条件共用一次查询结果
    pub fn name(&self) -> &str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Load => "load",
            Metric::Ram => "ram",
            Metric::DiskRead => "disk-read",
            Metric::DiskWrite => "disk-write",
            Metric::NetworkRx => "network-rx",
            Metric::NetworkTx => "network-tx",
            Metric::NoData => "nodata",
            Metric::Custom(target) => target,
        }
    }

    /// 上游以 bytes/sec 上报的吞吐类指标
    pub fn is_throughput(&self) -> bool {
        matches!(
            self,
            Metric::DiskRead | Metric::DiskWrite | Metric::NetworkRx | Metric::NetworkTx
        )
    }

    /// 通知中展示的数值（吞吐类换算为 KB/s）
    pub fn display_value(&self, raw: f64) -> f64 {
        if self.is_throughput() {
            raw / 1024.0
        } else {
            raw
        }
    }
}

impl FromStr for Metric {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let metric = match s.trim() {
            "" => return Err(ModelError::UnknownMetric(s.to_string())),
            "cpu" => Metric::Cpu,
            "load" => Metric::Load,
            "ram" => Metric::Ram,
            "disk-read" => Metric::DiskRead,
            // old rules were created with plain "disk"
            "disk" | "disk-write" => Metric::DiskWrite,
            "network-rx" => Metric::NetworkRx,
            "network-tx" => Metric::NetworkTx,
            "nodata" => Metric::NoData,
            other => Metric::Custom(other.to_string()),
        };
        Ok(metric)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 阈值比较方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Lt,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Lt => "lt",
        }
    }

    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
        }
    }

    /// 朝阈值方向的极值：gt 取最大值，lt 取最小值
    pub fn extreme(&self, values: impl IntoIterator<Item = f64>) -> Option<f64> {
        let pick: fn(f64, f64) -> f64 = match self {
            Operator::Gt => f64::max,
            Operator::Lt => f64::min,
        };
        values.into_iter().reduce(pick)
    }
}

impl FromStr for Operator {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            other => Err(ModelError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Gt => "greater than",
            Operator::Lt => "less than",
        };
        f.write_str(text)
    }
}

/// 窗口内多个采样点的合并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    All,
    Any,
    Avg,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::All => "all",
            Aggregate::Any => "any",
            Aggregate::Avg => "avg",
        }
    }
}

impl FromStr for Aggregate {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(Aggregate::All),
            "any" => Ok(Aggregate::Any),
            "avg" => Ok(Aggregate::Avg),
            other => Err(ModelError::UnknownAggregate(other.to_string())),
        }
    }
}
