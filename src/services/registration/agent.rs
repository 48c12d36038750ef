use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::types::{AgentError, RegistrationConfig};
use crate::services::store::{EtcdStore, LeaseStore, StoreError};

/// 租约注册代理，负责在存储中维持本进程的存在标记
///
/// 存在标记挂在代理独占的租约上；续约停止后，存储端回收租约并一并删除标记。
#[derive(Debug)]
pub struct RegistrationAgent<S> {
    store: S,
    config: RegistrationConfig,
    value: Vec<u8>,
    ttl_secs: i64,
    lease_id: i64,
    span: tracing::Span,
}

impl RegistrationAgent<EtcdStore> {
    /// 连接 etcd 集群并注册存在标记
    pub async fn connect(
        endpoints: &[String],
        connect_timeout: Duration,
        config: RegistrationConfig,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let store = EtcdStore::connect(endpoints, connect_timeout)
            .await
            .map_err(AgentError::Connection)?;
        Self::start(store, config).await
    }
}

impl<S: LeaseStore> RegistrationAgent<S> {
    /// 申请租约并把存在标记挂到租约上
    pub async fn start(store: S, config: RegistrationConfig) -> Result<Self, AgentError> {
        config.validate()?;
        let ttl_secs = config.lease_ttl_secs()?;
        let value = serde_json::to_vec(&config.service)?;
        let span = tracing::info_span!(
            "lease_agent",
            key = %config.key,
            lease_id = tracing::field::Empty
        );

        let mut agent = Self {
            store,
            config,
            value,
            ttl_secs,
            lease_id: 0,
            span,
        };
        agent
            .register()
            .await
            .map_err(|source| AgentError::Registration {
                key: agent.config.key.clone(),
                source,
            })?;
        Ok(agent)
    }

    /// 与服务发现共享的存储句柄
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lease_id(&self) -> i64 {
        self.lease_id
    }

    /// 每隔 `renew_interval` 续约一次，直到 `shutdown` 被取消
    ///
    /// 进行中的续约会先完成，但单次续约最多等待一个间隔，超时计为失败。
    /// 连续失败 `max_renewal_failures` 次后返回 [`AgentError::LeaseRenewal`]。
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), AgentError> {
        let span = self.span.clone();
        async move {
            let interval = self.config.renew_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failures = 0u32;

            tracing::info!(
                interval_secs = interval.as_secs_f64(),
                ttl_secs = self.ttl_secs,
                "Starting lease renewal loop"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::info!("Shutdown requested, stopping lease renewal");
                        return Ok(());
                    }
                    _ = ticker.tick() => {}
                }

                // 续约必须在一个间隔内完成，超时按失败计数
                let renewal = tokio::time::timeout(interval, self.renew())
                    .await
                    .unwrap_or_else(|_| {
                        Err(StoreError::Unavailable(format!(
                            "keep-alive timed out after {interval:?}"
                        )))
                    });

                match renewal {
                    Ok(ttl) => {
                        if failures > 0 {
                            tracing::info!(previous_failures = failures, "Lease renewal recovered");
                        }
                        failures = 0;
                        tracing::debug!(ttl_secs = ttl, "Lease renewed");
                    }
                    Err(source) => {
                        failures += 1;
                        tracing::warn!(
                            error = %source,
                            failures,
                            max_failures = self.config.max_renewal_failures,
                            "Lease renewal failed"
                        );
                        if failures >= self.config.max_renewal_failures {
                            tracing::error!(failures, "Giving up on lease renewal");
                            return Err(AgentError::LeaseRenewal { failures, source });
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    // 续约一次；租约已被存储端回收时重新注册
    async fn renew(&mut self) -> Result<i64, StoreError> {
        let ttl = self.store.keep_alive(self.lease_id).await?;
        if ttl > 0 {
            return Ok(ttl);
        }

        tracing::warn!(lease_id = self.lease_id, "Lease no longer exists, re-registering");
        self.register().await?;
        Ok(self.ttl_secs)
    }

    async fn register(&mut self) -> Result<(), StoreError> {
        let ttl = self.ttl_secs;
        let lease_id = self.store.grant_lease(ttl).await?;
        self.store
            .put_with_lease(&self.config.key, self.value.clone(), lease_id)
            .await?;

        self.lease_id = lease_id;
        self.span.record("lease_id", lease_id);
        tracing::info!(
            parent: &self.span,
            key = %self.config.key,
            lease_id,
            ttl_secs = ttl,
            "Presence marker registered"
        );
        Ok(())
    }
}
