//! Coordination store module
//!
//! The store seam is split into:
//! - `types`: key/value entries and the store error type
//! - `etcd`: etcd v3 backed implementation
//! - `memory`: in-process implementation with failure injection

pub mod etcd;
pub mod memory;
pub mod types;

use std::future::Future;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use types::{KeyValue, StoreError};

/// 协调存储的读接口
///
/// 实现应当可以廉价克隆，并能在并发请求处理间共享；并发安全由客户端自身保证。
pub trait KvStore: Clone + Send + Sync + 'static {
    /// 按键顺序查询所有以 `prefix` 开头的键
    fn get_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<KeyValue>, StoreError>> + Send;
}

/// 注册代理使用的租约操作
pub trait LeaseStore: KvStore {
    /// 申请 TTL 为 `ttl_secs` 秒的租约，返回租约 ID
    fn grant_lease(&self, ttl_secs: i64) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// 把 `value` 写入 `key` 并挂到 `lease_id` 上
    fn put_with_lease(
        &self,
        key: &str,
        value: Vec<u8>,
        lease_id: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 续约一次 `lease_id` 并返回剩余 TTL
    /// 返回值 `<= 0` 表示存储端已不存在该租约
    fn keep_alive(&self, lease_id: i64) -> impl Future<Output = Result<i64, StoreError>> + Send;
}
