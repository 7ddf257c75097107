use crate::error::{Result, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// 轮询间隔
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 锁等待策略
#[derive(Debug, Clone)]
pub struct LockPolicy {
    /// 最长等待时间
    pub wait: Duration,
    /// 等待超时后是否强行打破旧锁
    ///
    /// 打破锁会破坏互斥，仅在持有者可能已经崩溃且无法释放时开启。
    pub break_stale: bool,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(10),
            break_stale: false,
        }
    }
}

/// 按 key 互斥的锁表
///
/// 每次获取都会分配一个新的 token，守卫释放时只删除自己的 token，
/// 被打破的旧守卫因此不会误删新持有者的锁。
pub struct KeyedLock {
    held: Mutex<HashMap<String, u64>>,
    next_token: AtomicU64,
    policy: LockPolicy,
}

impl KeyedLock {
    pub fn new(policy: LockPolicy) -> Arc<Self> {
        Arc::new(Self {
            held: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            policy,
        })
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    /// 获取 key 对应的锁，按策略轮询等待
    pub async fn acquire(self: &Arc<Self>, key: &str) -> Result<LockGuard> {
        let started = Instant::now();

        loop {
            if let Some(token) = self.try_insert(key, false) {
                return Ok(self.guard(key, token));
            }

            let waited = started.elapsed();
            if waited >= self.policy.wait {
                if self.policy.break_stale {
                    error!(
                        key = %key,
                        waited_ms = waited.as_millis() as u64,
                        "Lock wait expired, breaking lock"
                    );
                    if let Some(token) = self.try_insert(key, true) {
                        return Ok(self.guard(key, token));
                    }
                }
                return Err(StoreError::LockTimeout {
                    uuid: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    /// 当前是否由 token 持有
    pub fn holds(&self, key: &str, token: u64) -> bool {
        self.table().get(key) == Some(&token)
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.table().contains_key(key)
    }

    fn try_insert(&self, key: &str, force: bool) -> Option<u64> {
        let mut held = self.table();
        if held.contains_key(key) && !force {
            return None;
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        held.insert(key.to_string(), token);
        Some(token)
    }

    fn release(&self, key: &str, token: u64) {
        let mut held = self.table();
        if held.get(key) == Some(&token) {
            held.remove(key);
            debug!(key = %key, "Lock released");
        } else {
            debug!(key = %key, "Lock was broken by another holder, nothing to release");
        }
    }

    fn guard(self: &Arc<Self>, key: &str, token: u64) -> LockGuard {
        debug!(key = %key, "Lock acquired");
        LockGuard {
            lock: Arc::clone(self),
            key: key.to_string(),
            token,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // 临界区内不会 panic，中毒时直接取回数据
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 锁守卫，drop 时释放
#[derive(Debug)]
pub struct LockGuard {
    lock: Arc<KeyedLock>,
    key: String,
    token: u64,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// 锁是否仍由本守卫持有
    pub fn is_held(&self) -> bool {
        self.lock.holds(&self.key, self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.release(&self.key, self.token);
    }
}

impl std::fmt::Debug for KeyedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLock")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(wait_ms: u64, break_stale: bool) -> LockPolicy {
        LockPolicy {
            wait: Duration::from_millis(wait_ms),
            break_stale,
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let lock = KeyedLock::new(LockPolicy::default());

        let guard = lock.acquire("m1").await.unwrap();
        assert!(lock.is_locked("m1"));
        assert!(guard.is_held());
        assert!(!lock.is_locked("m2"));

        drop(guard);
        assert!(!lock.is_locked("m1"));
    }

    #[tokio::test]
    async fn test_timeout_when_held() {
        let lock = KeyedLock::new(policy(120, false));

        let _guard = lock.acquire("m1").await.unwrap();
        let err = lock.acquire("m1").await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        // 其他 key 不受影响
        assert!(lock.acquire("m2").await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let lock = KeyedLock::new(policy(2000, false));

        let guard = lock.acquire("m1").await.unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire("m1").await.map(|g| g.token()) })
        };

        tokio::time::sleep(Duration::from_millis(120)).await;
        let first = guard.token();
        drop(guard);

        let second = waiter.await.unwrap().unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_break_stale_lock() {
        let lock = KeyedLock::new(policy(100, true));

        let stale = lock.acquire("m1").await.unwrap();
        let fresh = lock.acquire("m1").await.unwrap();

        assert!(!stale.is_held());
        assert!(fresh.is_held());

        // 旧守卫释放时不能删除新持有者的锁
        drop(stale);
        assert!(fresh.is_held());
        drop(fresh);
        assert!(!lock.is_locked("m1"));
    }
}
