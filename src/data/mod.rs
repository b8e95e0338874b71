//! Data layer module
//!
//! Typed records plus the flat-file record store both subsystems persist
//! through:
//! - account snapshots, namespaced per category
//! - toots, in a single flat namespace

mod models;
mod store;

pub use models::*;
pub use store::{RecordStore, StoreError, StoredEntry};

/// Namespace holding cached toots
pub const TOOT_NAMESPACE: &str = "toots";

/// Namespace for a category's account snapshots
pub fn account_namespace(category: &str) -> String {
    format!("accounts/{}", category)
}
