use crate::error::AlertError;
use crate::evaluator::{AlertEvaluator, MachineReport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};
use vigil_store::{ConditionStore, StoreError};

/// 调度参数
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// 两轮之间的目标间隔
    pub period: Duration,
    /// 并发求值的主机数上限
    pub workers: usize,
    /// 单台主机求值超时
    pub evaluation_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            workers: 10,
            evaluation_timeout: Duration::from_secs(45),
        }
    }
}

/// 一轮求值的统计
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub machines: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub notified: usize,
    pub elapsed: Duration,
}

/// 本轮结束后的睡眠时长，已超过周期时返回 `None`
fn remaining_sleep(period: Duration, elapsed: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|remaining| !remaining.is_zero())
}

/// 周期性求值所有主机
pub struct AlertRunner {
    store: Arc<dyn ConditionStore>,
    evaluator: Arc<AlertEvaluator>,
    settings: RunnerSettings,
}

pub struct RunnerHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl RunnerHandle {
    /// 等待当前一轮结束后停止
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join_handle.await;
    }

    pub fn abort(self) {
        self.join_handle.abort();
    }
}

impl AlertRunner {
    pub fn new(
        store: Arc<dyn ConditionStore>,
        evaluator: Arc<AlertEvaluator>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            store,
            evaluator,
            settings,
        }
    }

    /// 执行一轮：所有主机并发求值，等待全部结束
    ///
    /// 单台主机的错误、panic 和超时只记录日志，不影响其他主机。
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let started = Instant::now();
        let machines = self.store.list_machines().await?;

        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();

        for machine in machines {
            let semaphore = semaphore.clone();
            let evaluator = self.evaluator.clone();
            let timeout = self.settings.evaluation_timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let uuid = machine.uuid.clone();

                let mut task =
                    tokio::spawn(async move { evaluator.check_machine(&machine).await });
                let outcome = match tokio::time::timeout(timeout, &mut task).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(join_err)) => Err(AlertError::Panicked(join_err.to_string())),
                    Err(_) => {
                        task.abort();
                        Err(AlertError::Timeout(timeout))
                    }
                };
                (uuid, outcome)
            });
        }

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            report.machines += 1;
            match joined {
                Ok((_, Ok(machine_report))) => {
                    report.succeeded += 1;
                    report.notified += machine_report.notified;
                }
                Ok((uuid, Err(e))) => {
                    report.failed += 1;
                    error!(machine = %uuid, error = %e, "Machine evaluation failed");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "Machine evaluation task failed");
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// 单台主机求值，供按需检查使用
    pub async fn check_one(&self, uuid: &str) -> Result<Option<MachineReport>, AlertError> {
        let Some(machine) = self.store.get_machine(uuid).await? else {
            return Ok(None);
        };
        self.evaluator.check_machine(&machine).await.map(Some)
    }

    /// 启动后台循环
    ///
    /// 每轮结束后睡眠 `period - elapsed`；超时的一轮不睡眠，轮次之间不会重叠。
    pub fn start(self: Arc<Self>) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join_handle = tokio::spawn(async move {
            info!(
                period_secs = self.settings.period.as_secs_f64(),
                workers = self.settings.workers,
                "Alert runner started"
            );

            loop {
                let started = Instant::now();
                match self.run_cycle().await {
                    Ok(report) => info!(
                        machines = report.machines,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        notified = report.notified,
                        "Run completed in {:.1} seconds",
                        report.elapsed.as_secs_f64()
                    ),
                    Err(e) => error!(error = %e, "Failed to list machines"),
                }

                let elapsed = started.elapsed();
                let sleep = match remaining_sleep(self.settings.period, elapsed) {
                    Some(remaining) => {
                        info!("Sleeping for {:.1} seconds", remaining.as_secs_f64());
                        remaining
                    }
                    None => {
                        warn!(
                            elapsed_secs = elapsed.as_secs_f64(),
                            period_secs = self.settings.period.as_secs_f64(),
                            "Run overran the alert period, not sleeping"
                        );
                        Duration::ZERO
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(sleep) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }

                if *shutdown_rx.borrow() {
                    break;
                }
            }

            info!("Alert runner stopped");
        });

        RunnerHandle {
            shutdown_tx,
            join_handle,
        }
    }
}
