//! State store port (driven/secondary port)
//!
//! Durable key/value storage of [`PersistedState`] keyed by [`RelPath`].
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - At most one state exists per key. `rename_key` must delete the old key
//!   and write the new one as a single atomic operation.

use crate::domain::{PersistedState, RelPath};

/// Port trait for persistent per-path state
#[async_trait::async_trait]
pub trait IStateStore: Send + Sync {
    /// Returns every persisted state
    async fn get_all(&self) -> anyhow::Result<Vec<(RelPath, PersistedState)>>;

    /// Returns the state stored under `path`, if any
    async fn get(&self, path: &RelPath) -> anyhow::Result<Option<PersistedState>>;

    /// Inserts or replaces the state stored under `path`
    async fn put(&self, path: &RelPath, state: &PersistedState) -> anyhow::Result<()>;

    /// Removes the state stored under `path`; missing keys are not an error
    async fn delete(&self, path: &RelPath) -> anyhow::Result<()>;

    /// Moves the state stored under `from` to `to`, replacing anything at `to`
    ///
    /// # Errors
    /// Fails if no state exists under `from`.
    async fn rename_key(&self, from: &RelPath, to: &RelPath) -> anyhow::Result<()>;
}
