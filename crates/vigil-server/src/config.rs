use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_alert::{EvaluatorSettings, RunnerSettings};
use vigil_core::DEFAULT_REMINDER_LIST;
use vigil_notify::CoreConfig;
use vigil_series::GraphiteConfig;
use vigil_store::{LockPolicy, StoreConfig};

/// 环境变量前缀，如 `VIGIL_ALERT__PERIOD_SECS=30`
pub const ENV_PREFIX: &str = "VIGIL";

/// 新规则生效前的等待上限（一年）
pub const MAX_GRACE_PERIOD_SECS: u64 = 366 * 24 * 3600;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub graphite: GraphiteSection,
    #[serde(default)]
    pub core: CoreSection,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphiteSection {
    #[serde(default = "default_graphite_uri")]
    pub uri: String,
    /// 主机在 Graphite 中的路径前缀
    #[serde(default = "default_machine_prefix")]
    pub machine_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 每次求值查询的窗口
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoreSection {
    #[serde(default = "default_core_uri")]
    pub uri: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_evaluation_timeout_secs")]
    pub evaluation_timeout_secs: u64,
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_reminder_list")]
    pub reminder_list: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    /// JSON 快照路径，不设置时只保存在内存
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_lock_wait_secs")]
    pub lock_wait_secs: u64,
    #[serde(default)]
    pub break_stale_locks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// 默认值函数
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_graphite_uri() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_machine_prefix() -> String {
    "collectd".to_string()
}

fn default_core_uri() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_lookback_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_period_secs() -> u64 {
    60
}

fn default_workers() -> usize {
    10
}

fn default_evaluation_timeout_secs() -> u64 {
    45
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_reminder_list() -> Vec<u64> {
    DEFAULT_REMINDER_LIST.to_vec()
}

fn default_lock_wait_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default trait 实现
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GraphiteSection {
    fn default() -> Self {
        Self {
            uri: default_graphite_uri(),
            machine_prefix: default_machine_prefix(),
            timeout_secs: default_timeout_secs(),
            lookback_secs: default_lookback_secs(),
            interval_secs: None,
        }
    }
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            uri: default_core_uri(),
            timeout_secs: default_timeout_secs(),
            ssl_verify: true,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            workers: default_workers(),
            evaluation_timeout_secs: default_evaluation_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            reminder_list: default_reminder_list(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            lock_wait_secs: default_lock_wait_secs(),
            break_stale_locks: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 加载配置：TOML 文件（可选）叠加 `VIGIL_` 环境变量
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// 指定环境变量来源加载，`None` 时读取进程环境
    pub fn load_with_env(path: &Path, env: Option<HashMap<String, String>>) -> Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid config path: {}", path.display()))?;

        let config = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("alert.reminder_list")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.alert.period_secs == 0 {
            return Err(anyhow!("alert.period_secs must be greater than 0"));
        }
        if self.alert.workers == 0 {
            return Err(anyhow!("alert.workers must be greater than 0"));
        }
        if self.alert.evaluation_timeout_secs == 0 {
            return Err(anyhow!("alert.evaluation_timeout_secs must be greater than 0"));
        }
        if self.alert.grace_period_secs > MAX_GRACE_PERIOD_SECS {
            return Err(anyhow!(
                "alert.grace_period_secs must be at most {}, got {}",
                MAX_GRACE_PERIOD_SECS,
                self.alert.grace_period_secs
            ));
        }
        if self.alert.reminder_list.is_empty() {
            return Err(anyhow!("alert.reminder_list must not be empty"));
        }
        if self.alert.reminder_list.windows(2).any(|w| w[0] > w[1]) {
            return Err(anyhow!(
                "alert.reminder_list must be non-decreasing, got {:?}",
                self.alert.reminder_list
            ));
        }
        if self.graphite.uri.trim().is_empty() {
            return Err(anyhow!("graphite.uri must be set"));
        }
        if self.graphite.lookback_secs == 0 {
            return Err(anyhow!("graphite.lookback_secs must be greater than 0"));
        }
        if self.core.uri.trim().is_empty() {
            return Err(anyhow!("core.uri must be set"));
        }
        Ok(())
    }

    pub fn graphite_config(&self) -> GraphiteConfig {
        GraphiteConfig {
            uri: self.graphite.uri.clone(),
            timeout_secs: self.graphite.timeout_secs,
        }
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            uri: self.core.uri.clone(),
            timeout_secs: self.core.timeout_secs,
            ssl_verify: self.core.ssl_verify,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            snapshot_path: self.store.snapshot_path.clone(),
            lock: LockPolicy {
                wait: Duration::from_secs(self.store.lock_wait_secs),
                break_stale: self.store.break_stale_locks,
            },
        }
    }

    /// 超出上限的值按上限处理，`validate()` 会拒绝这类配置
    pub fn grace_period(&self) -> chrono::Duration {
        let secs = self.alert.grace_period_secs.min(MAX_GRACE_PERIOD_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            grace_period: self.grace_period(),
            reminder_list: self.alert.reminder_list.clone(),
            lookback_secs: self.graphite.lookback_secs,
            interval_secs: self.graphite.interval_secs,
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            period: Duration::from_secs(self.alert.period_secs),
            workers: self.alert.workers,
            evaluation_timeout: Duration::from_secs(self.alert.evaluation_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_with_env(&dir.path().join("missing.toml"), no_env()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.alert.period_secs, 60);
        assert_eq!(config.alert.workers, 10);
        assert_eq!(config.alert.evaluation_timeout_secs, 45);
        assert_eq!(config.alert.reminder_list, vec![0, 60, 300, 600]);
        assert_eq!(config.graphite.machine_prefix, "collectd");
        assert!(config.core.ssl_verify);
        assert!(!config.store.break_stale_locks);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        fs::write(
            &path,
            r#"
[graphite]
uri = "http://graphite:8080"
interval_secs = 30

[core]
uri = "https://core.example.com"
ssl_verify = false

[alert]
period_secs = 30
reminder_list = [0, 120]

[store]
snapshot_path = "/var/lib/vigil/store.json"
break_stale_locks = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_with_env(&path, no_env()).unwrap();
        assert_eq!(config.graphite.uri, "http://graphite:8080");
        assert_eq!(config.graphite.interval_secs, Some(30));
        assert!(!config.core.ssl_verify);
        assert_eq!(config.alert.period_secs, 30);
        assert_eq!(config.alert.workers, 10);
        assert_eq!(config.alert.reminder_list, vec![0, 120]);

        let store = config.store_config();
        assert_eq!(
            store.snapshot_path,
            Some(PathBuf::from("/var/lib/vigil/store.json"))
        );
        assert!(store.lock.break_stale);
        assert_eq!(store.lock.wait, Duration::from_secs(10));

        let settings = config.evaluator_settings();
        assert_eq!(settings.interval_secs, Some(30));
        assert_eq!(settings.grace_period, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        fs::write(&path, "[alert]\nworkers = 4\n").unwrap();

        let env = HashMap::from([
            ("VIGIL_ALERT__WORKERS".to_string(), "16".to_string()),
            ("VIGIL_SERVER__PORT".to_string(), "9090".to_string()),
            ("VIGIL_ALERT__REMINDER_LIST".to_string(), "0,30,90".to_string()),
        ]);

        let config = AppConfig::load_with_env(&path, Some(env)).unwrap();
        assert_eq!(config.alert.workers, 16);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.alert.reminder_list, vec![0, 30, 90]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.alert.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.alert.reminder_list = vec![60, 0];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.core.uri = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.alert.grace_period_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.grace_period(),
            chrono::Duration::seconds(MAX_GRACE_PERIOD_SECS as i64)
        );

        let mut config = AppConfig::default();
        config.alert.grace_period_secs = MAX_GRACE_PERIOD_SECS;
        assert!(config.validate().is_ok());

        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        fs::write(&path, "[alert]\nperiod_secs = 0\n").unwrap();
        assert!(AppConfig::load_with_env(&path, no_env()).is_err());
    }
}
