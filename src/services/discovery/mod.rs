//! Discovery reader module
//!
//! Turns the registrations stored under the service namespace into the
//! HTTP service discovery document:
//! - `types`: registration value, target group and error types
//! - `key`: registration key parser
//! - `reader`: the listing itself

pub mod key;
pub mod reader;
pub mod types;

pub use key::RegistrationKey;
pub use reader::{JOB_LABEL, list, target_group};
pub use types::{DiscoveryError, ServiceDef, TargetGroup};
