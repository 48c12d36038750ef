use std::time::Duration;

use thiserror::Error;

use crate::services::discovery::ServiceDef;
use crate::services::store::StoreError;

/// 注册代理配置
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// 租约 TTL
    pub lease_ttl: Duration,
    /// 续约间隔，必须小于 TTL 的一半
    pub renew_interval: Duration,
    /// 连续续约失败多少次后退出
    pub max_renewal_failures: u32,
    /// 自身存在标记的键
    pub key: String,
    /// 自身存在标记的值
    pub service: ServiceDef,
}

impl RegistrationConfig {
    /// 以秒表示的租约 TTL，超出 i64 范围时报错
    pub fn lease_ttl_secs(&self) -> Result<i64, AgentError> {
        i64::try_from(self.lease_ttl.as_secs()).map_err(|_| {
            AgentError::InvalidTiming(format!("lease ttl {:?} is out of range", self.lease_ttl))
        })
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        self.lease_ttl_secs()?;
        if self.lease_ttl.as_secs() == 0 {
            return Err(AgentError::InvalidTiming(format!(
                "lease ttl {:?} must be at least one second",
                self.lease_ttl
            )));
        }
        let too_slow = self
            .renew_interval
            .checked_mul(2)
            .is_none_or(|doubled| doubled >= self.lease_ttl);
        if self.renew_interval.is_zero() || too_slow {
            return Err(AgentError::InvalidTiming(format!(
                "renew interval {:?} must be non-zero and less than half of lease ttl {:?}",
                self.renew_interval, self.lease_ttl
            )));
        }
        if self.max_renewal_failures == 0 {
            return Err(AgentError::InvalidTiming(
                "max renewal failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 注册代理错误类型
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("cannot connect to coordination store: {0}")]
    Connection(#[source] StoreError),

    #[error("invalid lease timing: {0}")]
    InvalidTiming(String),

    #[error("failed to encode registration: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("failed to register {key}: {source}")]
    Registration {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("lease renewal failed {failures} consecutive times: {source}")]
    LeaseRenewal {
        failures: u32,
        #[source]
        source: StoreError,
    },
}
