pub mod api;
pub mod config;
pub mod error;
pub mod models;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use vigil_alert::{AlertEvaluator, AlertRunner};
use vigil_notify::{CoreNotifier, NotifyManager};
use vigil_series::{GraphiteBackend, SeriesAggregator, TargetBuilder};
use vigil_store::{ConditionStore, MachineAdmin, MemoryStore};

pub use api::create_router;
pub use config::AppConfig;

/// API 应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConditionStore>,
    pub series: Arc<SeriesAggregator>,
    pub admin: Arc<MachineAdmin>,
    pub runner: Arc<AlertRunner>,
}

/// 进程内的全部服务，启动时构建一次
pub struct Services {
    pub store: Arc<dyn ConditionStore>,
    pub series: Arc<SeriesAggregator>,
    pub admin: Arc<MachineAdmin>,
    pub runner: Arc<AlertRunner>,
}

impl Services {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn ConditionStore> =
            Arc::new(MemoryStore::open(config.store_config()).await?);

        let backend = Arc::new(GraphiteBackend::new(config.graphite_config())?);
        let series = Arc::new(SeriesAggregator::new(
            backend,
            TargetBuilder::new(config.graphite.machine_prefix.clone()),
        ));

        let notifier = Arc::new(CoreNotifier::new(config.core_config())?);
        let notify = Arc::new(NotifyManager::new(notifier));

        let evaluator = Arc::new(AlertEvaluator::new(
            store.clone(),
            series.clone(),
            notify,
            config.evaluator_settings(),
        ));
        let runner = Arc::new(AlertRunner::new(
            store.clone(),
            evaluator,
            config.runner_settings(),
        ));
        let admin = Arc::new(MachineAdmin::new(store.clone(), config.grace_period()));

        info!(
            graphite = %config.graphite.uri,
            core = %config.core.uri,
            snapshot = ?config.store.snapshot_path,
            "Services initialized"
        );

        Ok(Self {
            store,
            series,
            admin,
            runner,
        })
    }

    pub fn state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            series: self.series.clone(),
            admin: self.admin.clone(),
            runner: self.runner.clone(),
        }
    }
}
