use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 单个采样点（空值已剔除）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// epoch 秒
    pub timestamp: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// 查询名称 -> 按时间排序的采样点
pub type SeriesData = HashMap<String, Vec<DataPoint>>;
