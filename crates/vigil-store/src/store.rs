use crate::error::Result;
use crate::lock::LockGuard;
use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use vigil_core::{Condition, Machine};

/// 持锁期间的主机记录
///
/// 由 [`ConditionStore::lock_machine`] 返回，获取时已从存储刷新。
/// drop 时释放主机锁，无论调用方从哪条路径退出。
#[derive(Debug)]
pub struct MachineLease {
    machine: Machine,
    guard: LockGuard,
}

impl MachineLease {
    pub fn new(machine: Machine, guard: LockGuard) -> Self {
        Self { machine, guard }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// 租约对应的锁 token
    pub fn token(&self) -> u64 {
        self.guard.token()
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_held()
    }

    pub fn into_machine(self) -> Machine {
        self.machine
    }
}

impl Deref for MachineLease {
    type Target = Machine;

    fn deref(&self) -> &Machine {
        &self.machine
    }
}

impl DerefMut for MachineLease {
    fn deref_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}

/// 主机与条件存储
///
/// 主机记录的修改必须遵循 获取锁 -> 刷新 -> 修改 -> 保存 -> 释放 的流程；
/// 条件记录的读取不需要持锁。
#[async_trait]
pub trait ConditionStore: Send + Sync {
    async fn get_machine(&self, uuid: &str) -> Result<Option<Machine>>;

    async fn list_machines(&self) -> Result<Vec<Machine>>;

    /// 新建主机，已存在时返回 `MachineExists`
    async fn create_machine(&self, machine: Machine) -> Result<()>;

    /// 获取主机锁并刷新记录
    async fn lock_machine(&self, uuid: &str) -> Result<MachineLease>;

    /// 保存持锁修改后的主机，锁已丢失时返回 `LockLost`
    async fn save_machine(&self, lease: &MachineLease) -> Result<()>;

    /// 删除主机，删除后释放锁
    async fn delete_machine(&self, lease: MachineLease) -> Result<()>;

    /// 读取规则当前引用的条件
    async fn get_condition(&self, machine: &Machine, rule_id: &str) -> Result<Condition>;

    /// 新建或覆盖条件
    async fn save_condition(&self, condition: &Condition) -> Result<()>;

    /// 只更新已存在的条件，`cond_id` 已被删除时返回 `ConditionNotFound`
    async fn update_condition(&self, condition: &Condition) -> Result<()>;

    async fn delete_condition(&self, cond_id: &str) -> Result<()>;
}
