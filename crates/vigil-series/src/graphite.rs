use crate::backend::{RawSeries, RenderRequest, SeriesBackend};
use crate::error::{MetricBackendError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Graphite 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphiteConfig {
    pub uri: String,
    pub timeout_secs: u64,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            uri: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Graphite render API 后端
pub struct GraphiteBackend {
    config: GraphiteConfig,
    client: reqwest::Client,
}

impl GraphiteBackend {
    pub fn new(config: GraphiteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| MetricBackendError::Transport(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// 构造 render 请求的查询参数
    pub fn query_params(request: &RenderRequest) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = request
            .targets
            .iter()
            .map(|target| ("target", target.clone()))
            .collect();
        params.push(("format", "json".to_string()));
        if let Some(from) = &request.range.from {
            params.push(("from", from.to_param()));
        }
        if let Some(until) = &request.range.until {
            params.push(("until", until.to_param()));
        }
        params
    }

    fn render_url(&self) -> String {
        format!("{}/render", self.config.uri.trim_end_matches('/'))
    }
}

#[async_trait]
impl SeriesBackend for GraphiteBackend {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<RawSeries>> {
        if request.targets.is_empty() {
            return Err(MetricBackendError::InvalidQuery("no targets".to_string()));
        }

        let url = self.render_url();
        debug!(url = %url, targets = request.targets.len(), "Querying graphite");

        let response = self
            .client
            .get(&url)
            .query(&Self::query_params(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MetricBackendError::Timeout(self.config.timeout_secs)
                } else {
                    MetricBackendError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Got error response from graphite");
            return Err(MetricBackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MetricBackendError::Transport(e.to_string()))?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn name(&self) -> &str {
        "graphite"
    }
}
