use crate::backend::{RenderRequest, SeriesBackend};
use crate::error::Result;
use crate::model::{DataPoint, SeriesData};
use crate::query::{SeriesQuery, TargetBuilder, TimeRange};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 指标序列聚合器
///
/// 同一台主机的全部查询合并为一次后端请求。每个 target 以位置别名
/// `q<i>` 包装，结果再映射回调用方提供的查询名称。
pub struct SeriesAggregator {
    backend: Arc<dyn SeriesBackend>,
    targets: TargetBuilder,
}

impl SeriesAggregator {
    pub fn new(backend: Arc<dyn SeriesBackend>, targets: TargetBuilder) -> Self {
        Self { backend, targets }
    }

    pub fn targets(&self) -> &TargetBuilder {
        &self.targets
    }

    /// 查询一台主机的多个序列
    ///
    /// 空值采样被剔除；同名的多条序列合并后按时间排序。后端没有返回的
    /// 名称不会出现在结果中。
    pub async fn fetch(
        &self,
        uuid: &str,
        queries: &[SeriesQuery],
        range: &TimeRange,
    ) -> Result<SeriesData> {
        let mut result = SeriesData::new();
        if queries.is_empty() {
            return Ok(result);
        }

        let mut aliases: HashMap<String, &str> = HashMap::with_capacity(queries.len());
        let mut targets = Vec::with_capacity(queries.len());
        for (i, query) in queries.iter().enumerate() {
            let alias = format!("q{}", i);
            targets.push(
                self.targets
                    .target(uuid, &query.metric, range.interval, &alias),
            );
            aliases.insert(alias, query.name.as_str());
        }

        let request = RenderRequest {
            targets,
            range: range.clone(),
        };

        debug!(
            machine = %uuid,
            backend = self.backend.name(),
            queries = queries.len(),
            "Fetching series"
        );

        let series = self.backend.render(&request).await?;

        for raw in series {
            let Some(name) = aliases.get(raw.target.as_str()) else {
                warn!(machine = %uuid, target = %raw.target, "Backend returned unexpected series");
                continue;
            };

            let points = result.entry((*name).to_string()).or_default();
            points.extend(
                raw.datapoints
                    .into_iter()
                    .filter_map(|(value, ts)| value.map(|v| DataPoint::new(ts, v))),
            );
        }

        for points in result.values_mut() {
            points.sort_by_key(|p| p.timestamp);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawSeries;
    use crate::error::MetricBackendError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vigil_core::Metric;

    /// 返回固定结果并记录请求的后端
    struct FakeBackend {
        response: Vec<RawSeries>,
        fail: bool,
        requests: Mutex<Vec<RenderRequest>>,
    }

    impl FakeBackend {
        fn new(response: Vec<RawSeries>) -> Self {
            Self {
                response,
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SeriesBackend for FakeBackend {
        async fn render(&self, request: &RenderRequest) -> Result<Vec<RawSeries>> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(MetricBackendError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(self.response.clone())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn raw(target: &str, points: &[(Option<f64>, i64)]) -> RawSeries {
        RawSeries {
            target: target.to_string(),
            datapoints: points.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_fetch_maps_aliases_and_drops_nulls() {
        let backend = Arc::new(FakeBackend::new(vec![
            raw("q0", &[(Some(1.0), 10), (None, 20), (Some(3.0), 30)]),
            raw("q1", &[(Some(50.0), 10)]),
        ]));
        let aggregator = SeriesAggregator::new(backend.clone(), TargetBuilder::new("vigil"));

        let queries = vec![SeriesQuery::new(Metric::Load), SeriesQuery::new(Metric::Cpu)];
        let data = aggregator
            .fetch("m1", &queries, &TimeRange::last_secs(60))
            .await
            .unwrap();

        assert_eq!(
            data.get("load").unwrap(),
            &vec![DataPoint::new(10, 1.0), DataPoint::new(30, 3.0)]
        );
        assert_eq!(data.get("cpu").unwrap(), &vec![DataPoint::new(10, 50.0)]);

        // 所有查询只发一次请求
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].targets.len(), 2);
        assert_eq!(requests[0].targets[0], "alias(vigil-m1.load.load.shortterm,'q0')");
    }

    #[tokio::test]
    async fn test_fetch_merges_and_sorts_same_name() {
        let backend = Arc::new(FakeBackend::new(vec![
            raw("q0", &[(Some(5.0), 30), (Some(1.0), 10)]),
            raw("q0", &[(Some(2.0), 20)]),
        ]));
        let aggregator = SeriesAggregator::new(backend, TargetBuilder::default());

        let data = aggregator
            .fetch("m1", &[SeriesQuery::new(Metric::Load)], &TimeRange::new())
            .await
            .unwrap();

        let timestamps: Vec<i64> = data["load"].iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_missing_series_are_absent() {
        // 未知主机的 nodata 查询不返回任何序列
        let backend = Arc::new(FakeBackend::new(vec![raw("q0", &[(Some(0.5), 10)])]));
        let aggregator = SeriesAggregator::new(backend, TargetBuilder::default());

        let queries = vec![SeriesQuery::new(Metric::Load), SeriesQuery::new(Metric::NoData)];
        let data = aggregator
            .fetch("m1", &queries, &TimeRange::new())
            .await
            .unwrap();

        assert!(data.contains_key("load"));
        assert!(!data.contains_key("nodata"));
    }

    #[tokio::test]
    async fn test_interval_wraps_summarize() {
        let backend = Arc::new(FakeBackend::new(Vec::new()));
        let aggregator = SeriesAggregator::new(backend.clone(), TargetBuilder::new("vigil"));

        let range = TimeRange::last_secs(120).with_interval(60);
        let data = aggregator
            .fetch("m1", &[SeriesQuery::new(Metric::Load)], &range)
            .await
            .unwrap();
        assert!(data.is_empty());

        let requests = backend.requests.lock().unwrap();
        assert_eq!(
            requests[0].targets[0],
            "alias(summarize(vigil-m1.load.load.shortterm,\"60s\",\"avg\"),'q0')"
        );
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let mut backend = FakeBackend::new(Vec::new());
        backend.fail = true;
        let aggregator = SeriesAggregator::new(Arc::new(backend), TargetBuilder::default());

        let err = aggregator
            .fetch("m1", &[SeriesQuery::new(Metric::Cpu)], &TimeRange::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MetricBackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_empty_queries_skip_backend() {
        let backend = Arc::new(FakeBackend::new(Vec::new()));
        let aggregator = SeriesAggregator::new(backend.clone(), TargetBuilder::default());

        let data = aggregator.fetch("m1", &[], &TimeRange::new()).await.unwrap();
        assert!(data.is_empty());
        assert!(backend.requests.lock().unwrap().is_empty());
    }
}
