//! putsync Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `RelPath`, `PersistedState`, `LocalEntry`, `RemoteEntry`, `SyncRecord`
//! - **Port definitions** - Traits for adapters: `IRemoteFileService`, `IStateStore`, `IChangeNotifier`
//! - **Configuration** - The YAML configuration file and its validation
//!
//! # Architecture
//!
//! The domain module is pure data with no I/O. Ports define the trait
//! interfaces that the cache and remote adapter crates implement, and the
//! sync crate drives reconciliation through them.

pub mod config;
pub mod domain;
pub mod ports;
