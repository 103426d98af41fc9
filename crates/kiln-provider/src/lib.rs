//! Provider selection, cloud registry types, and credential handling for kiln.
//!
//! Holds the policy tables that decide which provider kinds tolerate a missing
//! registry entry and which must always re-prompt for credentials, plus the
//! credential resolver and its file-backed store.

mod cloud_registry;
mod credential_store;
mod credentials;
mod policy;
mod schema_catalog;
mod types;

pub use cloud_registry::*;
pub use credential_store::*;
pub use credentials::*;
pub use policy::*;
pub use schema_catalog::*;
pub use types::*;
