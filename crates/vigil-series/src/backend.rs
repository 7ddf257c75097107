use crate::error::Result;
use crate::query::TimeRange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 一次渲染请求：多个 target 合并为一次往返
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub targets: Vec<String>,
    pub range: TimeRange,
}

/// 后端返回的原始序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub target: String,
    /// [value|null, timestamp]
    pub datapoints: Vec<(Option<f64>, i64)>,
}

/// 时序后端 trait
#[async_trait]
pub trait SeriesBackend: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<RawSeries>>;

    fn name(&self) -> &str;
}
