use crate::error::{Result, StoreError};
use crate::lock::{KeyedLock, LockPolicy};
use crate::store::{ConditionStore, MachineLease};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vigil_core::{Condition, Machine};

/// 存储配置
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// JSON 快照路径，未设置时仅保存在内存
    pub snapshot_path: Option<PathBuf>,
    pub lock: LockPolicy,
}

/// 快照文件格式
#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    machines: Vec<Machine>,
    conditions: Vec<Condition>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    machines: Vec<&'a Machine>,
    conditions: Vec<&'a Condition>,
}

type Machines = HashMap<String, Machine>;
type Conditions = HashMap<String, Condition>;

/// 内存存储，可选 JSON 快照持久化
pub struct MemoryStore {
    machines: RwLock<Machines>,
    conditions: RwLock<Conditions>,
    locks: Arc<KeyedLock>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            machines: RwLock::new(HashMap::new()),
            conditions: RwLock::new(HashMap::new()),
            locks: KeyedLock::new(config.lock),
            snapshot_path: config.snapshot_path,
        }
    }

    /// 创建存储并加载已有快照
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config);

        let Some(path) = store.snapshot_path.clone() else {
            return Ok(store);
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    machines = snapshot.machines.len(),
                    conditions = snapshot.conditions.len(),
                    "Loaded store snapshot"
                );
                *store.machines.write().await = snapshot
                    .machines
                    .into_iter()
                    .map(|m| (m.uuid.clone(), m))
                    .collect();
                *store.conditions.write().await = snapshot
                    .conditions
                    .into_iter()
                    .map(|c| (c.cond_id.clone(), c))
                    .collect();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No store snapshot yet, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(store)
    }

    pub fn locks(&self) -> &Arc<KeyedLock> {
        &self.locks
    }

    pub async fn condition_count(&self) -> usize {
        self.conditions.read().await.len()
    }

    pub async fn get_condition_by_id(&self, cond_id: &str) -> Option<Condition> {
        self.conditions.read().await.get(cond_id).cloned()
    }

    /// 在两张表的写锁内执行修改
    ///
    /// 配置了快照时先在副本上修改并写盘，写盘成功后才替换内存中的表；
    /// 失败时内存保持原状。
    async fn commit<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Machines, &mut Conditions) -> Result<T> + Send,
        T: Send,
    {
        let mut machines = self.machines.write().await;
        let mut conditions = self.conditions.write().await;

        let Some(path) = &self.snapshot_path else {
            return mutate(&mut *machines, &mut *conditions);
        };

        let mut next_machines = machines.clone();
        let mut next_conditions = conditions.clone();
        let value = mutate(&mut next_machines, &mut next_conditions)?;

        write_snapshot(path, &next_machines, &next_conditions).await?;

        *machines = next_machines;
        *conditions = next_conditions;
        Ok(value)
    }

    fn check_lease(&self, lease: &MachineLease) -> Result<()> {
        if !self.locks.holds(&lease.uuid, lease.token()) {
            warn!(machine = %lease.uuid, "Attempted to save machine without holding its lock");
            return Err(StoreError::LockLost(lease.uuid.clone()));
        }
        Ok(())
    }
}

/// 写入快照：先写临时文件再重命名
async fn write_snapshot(path: &Path, machines: &Machines, conditions: &Conditions) -> Result<()> {
    let snapshot = SnapshotRef {
        machines: machines.values().collect(),
        conditions: conditions.values().collect(),
    };

    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!(path = %path.display(), bytes = bytes.len(), "Store snapshot written");
    Ok(())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl ConditionStore for MemoryStore {
    async fn get_machine(&self, uuid: &str) -> Result<Option<Machine>> {
        Ok(self.machines.read().await.get(uuid).cloned())
    }

    async fn list_machines(&self) -> Result<Vec<Machine>> {
        let machines = self.machines.read().await;
        let mut list: Vec<Machine> = machines.values().cloned().collect();
        list.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(list)
    }

    async fn create_machine(&self, machine: Machine) -> Result<()> {
        let uuid = machine.uuid.clone();
        self.commit(move |machines, _| {
            if machines.contains_key(&machine.uuid) {
                return Err(StoreError::MachineExists(machine.uuid));
            }
            machines.insert(machine.uuid.clone(), machine);
            Ok(())
        })
        .await?;

        info!(machine = %uuid, "Machine created");
        Ok(())
    }

    async fn lock_machine(&self, uuid: &str) -> Result<MachineLease> {
        let guard = self.locks.acquire(uuid).await?;

        // 持锁后再读，拿到最新记录
        let machine = self
            .machines
            .read()
            .await
            .get(uuid)
            .cloned()
            .ok_or_else(|| StoreError::MachineNotFound(uuid.to_string()))?;

        Ok(MachineLease::new(machine, guard))
    }

    async fn save_machine(&self, lease: &MachineLease) -> Result<()> {
        self.check_lease(lease)?;
        let machine = lease.machine().clone();
        self.commit(move |machines, _| {
            machines.insert(machine.uuid.clone(), machine);
            Ok(())
        })
        .await
    }

    async fn delete_machine(&self, lease: MachineLease) -> Result<()> {
        self.check_lease(&lease)?;
        let uuid = lease.uuid.clone();
        self.commit(|machines, _| {
            machines.remove(&uuid);
            Ok(())
        })
        .await?;

        info!(machine = %lease.uuid, "Machine deleted");
        Ok(())
    }

    async fn get_condition(&self, machine: &Machine, rule_id: &str) -> Result<Condition> {
        let rule = machine
            .rule(rule_id)
            .ok_or_else(|| StoreError::rule_not_found(&machine.uuid, rule_id))?;

        self.conditions
            .read()
            .await
            .get(&rule.condition_ref)
            .cloned()
            .ok_or_else(|| StoreError::ConditionNotFound {
                uuid: machine.uuid.clone(),
                rule_id: rule_id.to_string(),
                cond_id: rule.condition_ref.clone(),
            })
    }

    async fn save_condition(&self, condition: &Condition) -> Result<()> {
        let condition = condition.clone();
        self.commit(move |_, conditions| {
            conditions.insert(condition.cond_id.clone(), condition);
            Ok(())
        })
        .await
    }

    async fn update_condition(&self, condition: &Condition) -> Result<()> {
        let condition = condition.clone();
        self.commit(move |_, conditions| match conditions.get_mut(&condition.cond_id) {
            Some(current) => {
                *current = condition;
                Ok(())
            }
            None => Err(StoreError::ConditionNotFound {
                uuid: condition.uuid,
                rule_id: condition.rule_id,
                cond_id: condition.cond_id,
            }),
        })
        .await
    }

    async fn delete_condition(&self, cond_id: &str) -> Result<()> {
        if !self.conditions.read().await.contains_key(cond_id) {
            debug!(cond_id = %cond_id, "Condition already gone");
            return Ok(());
        }
        self.commit(|_, conditions| {
            conditions.remove(cond_id);
            Ok(())
        })
        .await
    }
}
