use crate::error::{Result, StoreError};
use crate::store::ConditionStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use vigil_core::{Condition, Machine, ModelError, Rule, RuleSpec};

/// 主机与规则管理
///
/// 所有操作都保持存储不变量：每条规则至多一个有效条件，不留孤立条件。
pub struct MachineAdmin {
    store: Arc<dyn ConditionStore>,
    grace_period: Duration,
}

impl MachineAdmin {
    pub fn new(store: Arc<dyn ConditionStore>, grace_period: Duration) -> Self {
        Self {
            store,
            grace_period,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConditionStore> {
        &self.store
    }

    /// 注册主机
    pub async fn add_machine(&self, uuid: &str, password: &str) -> Result<Machine> {
        if uuid.trim().is_empty() {
            return Err(ModelError::InvalidInput("machine uuid is required".to_string()).into());
        }
        if password.is_empty() {
            return Err(ModelError::InvalidInput("collectd password is required".to_string()).into());
        }

        let machine = Machine::new(uuid, password);
        self.store.create_machine(machine.clone()).await?;
        info!(machine = %uuid, "Machine added to monitoring");
        Ok(machine)
    }

    /// 移除主机及其全部条件
    pub async fn remove_machine(&self, uuid: &str) -> Result<()> {
        let lease = self.store.lock_machine(uuid).await?;

        for rule in lease.rules.values() {
            self.store.delete_condition(&rule.condition_ref).await?;
        }
        let rules = lease.rules.len();
        self.store.delete_machine(lease).await?;

        info!(machine = %uuid, rules, "Machine removed from monitoring");
        Ok(())
    }

    /// 新建或替换规则
    ///
    /// 总是创建新条件；持锁把规则指向新条件后删除旧条件。
    pub async fn update_rule(&self, uuid: &str, rule_id: &str, spec: RuleSpec) -> Result<Condition> {
        if rule_id.trim().is_empty() {
            return Err(ModelError::InvalidInput("rule id is required".to_string()).into());
        }
        spec.validate()?;

        if self.store.get_machine(uuid).await?.is_none() {
            return Err(StoreError::MachineNotFound(uuid.to_string()));
        }

        let condition = Condition::new(uuid, rule_id, &spec, Utc::now(), self.grace_period);
        self.store.save_condition(&condition).await?;

        let previous = match self.swap_rule(uuid, rule_id, &condition).await {
            Ok(previous) => previous,
            Err(e) => {
                // 规则未指向新条件，删除避免孤立
                if let Err(cleanup) = self.store.delete_condition(&condition.cond_id).await {
                    warn!(
                        machine = %uuid,
                        cond_id = %condition.cond_id,
                        error = %cleanup,
                        "Failed to clean up unused condition"
                    );
                }
                return Err(e);
            }
        };

        if let Some(old) = previous {
            self.store.delete_condition(&old.condition_ref).await?;
        }

        info!(
            machine = %uuid,
            rule_id = %rule_id,
            cond_id = %condition.cond_id,
            condition = %condition,
            "Rule updated"
        );
        Ok(condition)
    }

    /// 删除规则及其条件
    pub async fn remove_rule(&self, uuid: &str, rule_id: &str) -> Result<()> {
        let mut lease = self.store.lock_machine(uuid).await?;

        let rule = lease
            .rules
            .remove(rule_id)
            .ok_or_else(|| StoreError::rule_not_found(uuid, rule_id))?;
        self.store.delete_condition(&rule.condition_ref).await?;
        self.store.save_machine(&lease).await?;

        info!(machine = %uuid, rule_id = %rule_id, "Rule removed");
        Ok(())
    }

    async fn swap_rule(
        &self,
        uuid: &str,
        rule_id: &str,
        condition: &Condition,
    ) -> Result<Option<Rule>> {
        let mut lease = self.store.lock_machine(uuid).await?;
        let previous = lease.rules.insert(
            rule_id.to_string(),
            Rule {
                rule_id: rule_id.to_string(),
                condition_ref: condition.cond_id.clone(),
            },
        );
        self.store.save_machine(&lease).await?;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreConfig};
    use crate::store::MachineLease;
    use crate::LockPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn spec(metric: &str) -> RuleSpec {
        RuleSpec {
            metric: metric.to_string(),
            operator: "gt".to_string(),
            value: 80.0,
            aggregate: Some("all".to_string()),
            reminder_list: None,
            reminder_offset: None,
        }
    }

    fn setup() -> (Arc<MemoryStore>, MachineAdmin) {
        let store = Arc::new(MemoryStore::default());
        let admin = MachineAdmin::new(store.clone(), Duration::seconds(60));
        (store, admin)
    }

    #[tokio::test]
    async fn test_add_machine_validation() {
        let (_store, admin) = setup();

        assert!(matches!(
            admin.add_machine("", "pw").await.unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            admin.add_machine("m1", "").await.unwrap_err(),
            StoreError::Validation(_)
        ));

        admin.add_machine("m1", "pw").await.unwrap();
        assert!(matches!(
            admin.add_machine("m1", "pw").await.unwrap_err(),
            StoreError::MachineExists(_)
        ));
    }

    #[tokio::test]
    async fn test_update_rule_replaces_condition() {
        let (store, admin) = setup();
        admin.add_machine("m1", "pw").await.unwrap();

        let first = admin.update_rule("m1", "r1", spec("cpu")).await.unwrap();
        assert_eq!(first.notification_level, 1);
        assert!(!first.state);
        assert!(first.active_after > first.state_since);

        let second = admin.update_rule("m1", "r1", spec("load")).await.unwrap();
        assert_ne!(first.cond_id, second.cond_id);

        // 旧条件被删除，只剩一个
        assert_eq!(store.condition_count().await, 1);
        assert!(store.get_condition_by_id(&first.cond_id).await.is_none());

        let machine = store.get_machine("m1").await.unwrap().unwrap();
        let current = store.get_condition(&machine, "r1").await.unwrap();
        assert_eq!(current.metric, "load");
    }

    #[tokio::test]
    async fn test_update_rule_rejects_invalid_spec() {
        let (store, admin) = setup();
        admin.add_machine("m1", "pw").await.unwrap();

        let mut bad = spec("cpu");
        bad.operator = "eq".to_string();
        assert!(matches!(
            admin.update_rule("m1", "r1", bad).await.unwrap_err(),
            StoreError::Validation(_)
        ));

        assert!(matches!(
            admin.update_rule("m1", "r1", spec("")).await.unwrap_err(),
            StoreError::Validation(_)
        ));

        assert!(matches!(
            admin.update_rule("m2", "r1", spec("cpu")).await.unwrap_err(),
            StoreError::MachineNotFound(_)
        ));
        assert_eq!(store.condition_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_rule() {
        let (store, admin) = setup();
        admin.add_machine("m1", "pw").await.unwrap();
        admin.update_rule("m1", "r1", spec("cpu")).await.unwrap();
        admin.update_rule("m1", "r2", spec("ram")).await.unwrap();

        admin.remove_rule("m1", "r1").await.unwrap();
        assert_eq!(store.condition_count().await, 1);

        let machine = store.get_machine("m1").await.unwrap().unwrap();
        assert!(machine.rule("r1").is_none());
        assert!(machine.rule("r2").is_some());

        assert!(matches!(
            admin.remove_rule("m1", "r1").await.unwrap_err(),
            StoreError::RuleNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_remove_machine_cascades() {
        let (store, admin) = setup();
        admin.add_machine("m1", "pw").await.unwrap();
        admin.update_rule("m1", "r1", spec("cpu")).await.unwrap();
        admin.update_rule("m1", "r2", spec("nodata")).await.unwrap();

        admin.remove_machine("m1").await.unwrap();

        assert!(store.get_machine("m1").await.unwrap().is_none());
        assert_eq!(store.condition_count().await, 0);
        assert!(!store.locks().is_locked("m1"));

        assert!(matches!(
            admin.remove_machine("m1").await.unwrap_err(),
            StoreError::MachineNotFound(_)
        ));
    }

    /// 可让 save_machine 失败的存储
    struct FailingMachineSave {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ConditionStore for FailingMachineSave {
        async fn get_machine(&self, uuid: &str) -> Result<Option<Machine>> {
            self.inner.get_machine(uuid).await
        }

        async fn list_machines(&self) -> Result<Vec<Machine>> {
            self.inner.list_machines().await
        }

        async fn create_machine(&self, machine: Machine) -> Result<()> {
            self.inner.create_machine(machine).await
        }

        async fn lock_machine(&self, uuid: &str) -> Result<MachineLease> {
            self.inner.lock_machine(uuid).await
        }

        async fn save_machine(&self, lease: &MachineLease) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Other(anyhow::anyhow!("disk full")));
            }
            self.inner.save_machine(lease).await
        }

        async fn delete_machine(&self, lease: MachineLease) -> Result<()> {
            self.inner.delete_machine(lease).await
        }

        async fn get_condition(&self, machine: &Machine, rule_id: &str) -> Result<Condition> {
            self.inner.get_condition(machine, rule_id).await
        }

        async fn save_condition(&self, condition: &Condition) -> Result<()> {
            self.inner.save_condition(condition).await
        }

        async fn update_condition(&self, condition: &Condition) -> Result<()> {
            self.inner.update_condition(condition).await
        }

        async fn delete_condition(&self, cond_id: &str) -> Result<()> {
            self.inner.delete_condition(cond_id).await
        }
    }

    #[tokio::test]
    async fn test_update_rule_failed_machine_save_keeps_old_condition() {
        let store = Arc::new(FailingMachineSave {
            inner: MemoryStore::default(),
            fail: AtomicBool::new(false),
        });
        let admin = MachineAdmin::new(store.clone(), Duration::seconds(60));
        admin.add_machine("m1", "pw").await.unwrap();
        let first = admin.update_rule("m1", "r1", spec("cpu")).await.unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(admin.update_rule("m1", "r1", spec("load")).await.is_err());

        // 规则仍指向旧条件，新条件已清理
        assert_eq!(store.inner.condition_count().await, 1);
        let machine = store.get_machine("m1").await.unwrap().unwrap();
        let current = store.get_condition(&machine, "r1").await.unwrap();
        assert_eq!(current.cond_id, first.cond_id);
        assert!(!store.inner.locks().is_locked("m1"));
    }

    #[tokio::test]
    async fn test_update_rule_snapshot_failure_leaves_no_condition() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        let store = Arc::new(
            MemoryStore::open(StoreConfig {
                snapshot_path: Some(data_dir.join("store.json")),
                lock: LockPolicy::default(),
            })
            .await
            .unwrap(),
        );
        let admin = MachineAdmin::new(store.clone(), Duration::seconds(60));
        admin.add_machine("m1", "pw").await.unwrap();

        std::fs::remove_dir_all(&data_dir).unwrap();

        assert!(admin.update_rule("m1", "r1", spec("cpu")).await.is_err());
        assert_eq!(store.condition_count().await, 0);
        let machine = store.get_machine("m1").await.unwrap().unwrap();
        assert!(machine.rule("r1").is_none());
    }
}
