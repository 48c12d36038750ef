use std::collections::BTreeMap;

use super::key::RegistrationKey;
use super::types::{DiscoveryError, ServiceDef, TargetGroup};
use crate::services::store::{KeyValue, KvStore};

pub const JOB_LABEL: &str = "job";

/// 读取 `prefix` 下的全部注册信息，按存储的键顺序每个键生成一个目标组
///
/// 任意一条记录格式错误都会使整个列表失败。
pub async fn list<S: KvStore>(store: &S, prefix: &str) -> Result<Vec<TargetGroup>, DiscoveryError> {
    let entries = store.get_prefix(prefix).await?;
    tracing::debug!(prefix = %prefix, entries = entries.len(), "Listed registrations");

    entries.iter().map(target_group).collect()
}

/// 把单条存储记录转换为目标组
pub fn target_group(entry: &KeyValue) -> Result<TargetGroup, DiscoveryError> {
    let key = RegistrationKey::parse(&entry.key)?;
    let service: ServiceDef =
        serde_json::from_slice(&entry.value).map_err(|source| DiscoveryError::MalformedValue {
            key: entry.key.clone(),
            source,
        })?;

    tracing::trace!(
        key = %entry.key,
        job = %key.job,
        metrics_port = service.metrics_port,
        "Parsed registration"
    );

    Ok(TargetGroup {
        targets: vec![format!("{}:{}", key.instance, service.metrics_port)],
        labels: BTreeMap::from([(JOB_LABEL.to_string(), key.job.to_string())]),
    })
}
