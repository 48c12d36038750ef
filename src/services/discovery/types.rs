use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::store::StoreError;

/// 服务注册键对应的值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub service_port: i64,
    pub metrics_port: i64,
    pub metrics_url: String,
}

/// HTTP 服务发现文档中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// 服务发现错误类型
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Listing(#[from] StoreError),

    #[error("malformed registration key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },

    #[error("malformed registration value at {key:?}: {source}")]
    MalformedValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
