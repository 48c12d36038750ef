use std::sync::Arc;
use std::time::Duration;

use etcd_client::{
    Client, ConnectOptions, GetOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions,
};
use tokio::sync::Mutex;

use super::{KeyValue, KvStore, LeaseStore, StoreError};

// 单个租约的续约双向流
struct KeepAliveChannel {
    lease_id: i64,
    keeper: LeaseKeeper,
    stream: LeaseKeepAliveStream,
}

impl KeepAliveChannel {
    async fn renew(&mut self) -> Result<i64, StoreError> {
        self.keeper.keep_alive().await?;
        match self.stream.message().await? {
            Some(response) => Ok(response.ttl()),
            None => Err(StoreError::Unavailable(
                "keep-alive stream closed by server".to_string(),
            )),
        }
    }
}

/// 基于 etcd v3 的存储
///
/// 克隆开销很小，克隆体共享底层 gRPC 通道和续约流。
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    keep_alive: Arc<Mutex<Option<KeepAliveChannel>>>,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdStore").finish_non_exhaustive()
    }
}

impl EtcdStore {
    /// 连接 `endpoints` 并等待集群返回状态
    /// `timeout` 内没有任何节点响应时返回 [`StoreError::Connection`]
    pub async fn connect(endpoints: &[String], timeout: Duration) -> Result<Self, StoreError> {
        let connection_error = |message: String| StoreError::Connection {
            endpoints: endpoints.to_vec(),
            message,
        };

        let options = ConnectOptions::new()
            .with_connect_timeout(timeout)
            .with_timeout(timeout)
            .with_keep_alive(Duration::from_secs(30), Duration::from_secs(10));

        let handshake = async {
            let mut client = Client::connect(endpoints, Some(options))
                .await
                .map_err(|e| connection_error(e.to_string()))?;
            // connect 本身是惰性的，用 status 确认至少有一个节点可达
            let status = client
                .status()
                .await
                .map_err(|e| connection_error(e.to_string()))?;
            tracing::info!(
                endpoints = ?endpoints,
                version = %status.version(),
                "Connected to etcd"
            );
            Ok::<_, StoreError>(client)
        };

        let client = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| connection_error(format!("no endpoint answered within {timeout:?}")))??;

        Ok(Self {
            client,
            keep_alive: Arc::new(Mutex::new(None)),
        })
    }
}

impl KvStore for EtcdStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        response
            .kvs()
            .iter()
            .map(|kv| {
                let key = std::str::from_utf8(kv.key())
                    .map_err(|e| StoreError::Codec(format!("non utf-8 key: {e}")))?;
                Ok(KeyValue::new(key, kv.value()))
            })
            .collect()
    }
}

impl LeaseStore for EtcdStore {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<i64, StoreError> {
        let mut client = self.client.clone();
        let lease = client.lease_grant(ttl_secs, None).await?;
        Ok(lease.id())
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: Vec<u8>,
        lease_id: i64,
    ) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease_id)))
            .await?;
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64) -> Result<i64, StoreError> {
        let mut slot = self.keep_alive.lock().await;

        let reusable = matches!(slot.as_ref(), Some(channel) if channel.lease_id == lease_id);
        if !reusable {
            let mut client = self.client.clone();
            let (keeper, stream) = client.lease_keep_alive(lease_id).await?;
            *slot = Some(KeepAliveChannel {
                lease_id,
                keeper,
                stream,
            });
        }

        let Some(channel) = slot.as_mut() else {
            return Err(StoreError::Unavailable("keep-alive stream missing".to_string()));
        };

        let result = channel.renew().await;

        // 出错后丢弃该流，下次续约重新建立
        if result.is_err() {
            *slot = None;
        }
        result
    }
}
