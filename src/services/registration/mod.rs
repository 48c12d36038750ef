//! Lease-backed registration module
//!
//! - `types`: agent configuration and error types
//! - `agent`: lease grant, presence marker and the renewal loop

pub mod agent;
pub mod types;

pub use agent::RegistrationAgent;
pub use types::{AgentError, RegistrationConfig};
