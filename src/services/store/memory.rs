use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{KeyValue, KvStore, LeaseStore, StoreError};

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    lease_id: Option<i64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Entry>,
    // lease id -> ttl
    leases: HashMap<i64, i64>,
    next_lease_id: i64,
    listing_failure: Option<String>,
    list_delay: Option<Duration>,
    failing_keep_alives: u32,
    failing_grants: u32,
    keep_alive_calls: u64,
}

/// 进程内存储，键顺序与租约语义同 etcd，并支持故障注入
///
/// 租约不会自行过期；用 [`MemoryStore::revoke_lease`] 模拟存储端过期。
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 写入一条不挂租约的记录
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.state().entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                lease_id: None,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state().entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn lease_of(&self, key: &str) -> Option<i64> {
        self.state().entries.get(key).and_then(|entry| entry.lease_id)
    }

    /// 让后续列表请求都以 `message` 失败，直到调用 [`MemoryStore::restore_listing`]
    pub fn fail_listing(&self, message: impl Into<String>) {
        self.state().listing_failure = Some(message.into());
    }

    pub fn restore_listing(&self) {
        self.state().listing_failure = None;
    }

    /// 延迟每次列表请求，用于保持请求处于进行中
    pub fn set_list_delay(&self, delay: Duration) {
        self.state().list_delay = Some(delay);
    }

    pub fn fail_next_keep_alives(&self, count: u32) {
        self.state().failing_keep_alives = count;
    }

    pub fn fail_next_grants(&self, count: u32) {
        self.state().failing_grants = count;
    }

    pub fn keep_alive_calls(&self) -> u64 {
        self.state().keep_alive_calls
    }

    /// 删除租约及挂在其上的所有键
    pub fn revoke_lease(&self, lease_id: i64) {
        let mut state = self.state();
        state.leases.remove(&lease_id);
        state
            .entries
            .retain(|_, entry| entry.lease_id != Some(lease_id));
    }
}

impl KvStore for MemoryStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        let delay = self.state().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if let Some(message) = &state.listing_failure {
            return Err(StoreError::Unavailable(message.clone()));
        }

        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue::new(key.clone(), entry.value.clone()))
            .collect())
    }
}

impl LeaseStore for MemoryStore {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<i64, StoreError> {
        let mut state = self.state();
        if state.failing_grants > 0 {
            state.failing_grants -= 1;
            return Err(StoreError::Unavailable("lease grant rejected".to_string()));
        }
        state.next_lease_id += 1;
        let lease_id = state.next_lease_id;
        state.leases.insert(lease_id, ttl_secs);
        Ok(lease_id)
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: Vec<u8>,
        lease_id: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if !state.leases.contains_key(&lease_id) {
            return Err(StoreError::Unavailable(format!(
                "requested lease {lease_id} not found"
            )));
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                lease_id: Some(lease_id),
            },
        );
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64) -> Result<i64, StoreError> {
        let mut state = self.state();
        state.keep_alive_calls += 1;
        if state.failing_keep_alives > 0 {
            state.failing_keep_alives -= 1;
            return Err(StoreError::Unavailable("keep-alive timed out".to_string()));
        }
        Ok(state.leases.get(&lease_id).copied().unwrap_or(0))
    }
}
