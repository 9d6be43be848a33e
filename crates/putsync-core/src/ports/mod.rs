//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteFileService`] - Remote folder/file operations and resumable uploads
//! - [`IStateStore`] - Durable per-path state keyed by relative path
//! - [`IChangeNotifier`] - Push notifications that something changed remotely

pub mod change_notifier;
pub mod remote_file_service;
pub mod state_store;

pub use change_notifier::{IChangeNotifier, RemoteChange};
pub use remote_file_service::{ByteReader, IRemoteFileService, RemoteFile, UploadResult};
pub use state_store::IStateStore;
