//! Store Module
//!
//! Config and group stores built on the key-space codec and a [`KvBackend`].
//!
//! Both stores hold an `Arc` handle to the backend they were constructed
//! with; there is no process-wide client. Every operation takes a request
//! [`Context`] and checks it before each backend call.
//!
//! [`KvBackend`]: crate::kv::KvBackend
//! [`Context`]: crate::context::Context

mod config_store;
mod group_store;

pub use config_store::ConfigStore;
pub use group_store::GroupStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Encode a stored record as JSON
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a stored JSON record
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}
