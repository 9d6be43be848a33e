//! Domain entities and business logic
//!
//! This module contains the core domain types for putsync:
//! - Relative paths, the join key across every view of the tree
//! - Persisted per-path state and its status machine
//! - Ephemeral snapshot entries and per-path sync records
//! - Domain-specific error types

pub mod entry;
pub mod errors;
pub mod relpath;
pub mod state;

// Re-export commonly used types
pub use entry::{LocalEntry, RemoteEntry, SyncRecord};
pub use errors::DomainError;
pub use relpath::{children_first, is_ignored_name, same_name, RelPath, TEMP_DIR_NAME};
pub use state::{PersistedState, SyncStatus};
