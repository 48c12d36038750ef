use thiserror::Error;

// 存储中的一条键值记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unable to reach store endpoints {endpoints:?}: {message}")]
    Connection {
        endpoints: Vec<String>,
        message: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store returned undecodable data: {0}")]
    Codec(String),
}

impl From<etcd_client::Error> for StoreError {
    fn from(e: etcd_client::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
