pub mod discovery;
pub mod registration;
pub mod store;
pub mod supervisor;
pub mod web;

pub use discovery::{DiscoveryError, ServiceDef, TargetGroup};
pub use registration::{AgentError, RegistrationAgent, RegistrationConfig};
pub use store::{EtcdStore, KvStore, LeaseStore, MemoryStore, StoreError};
