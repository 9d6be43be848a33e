//! Remote change notifier port
//!
//! A long-lived push channel that reports "something changed remotely".
//! The sync core only uses it to decide *when* to run another pass, and to
//! abandon a download whose source file changed underneath it.

use tokio::sync::broadcast;

/// A change reported by the remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    /// Affected remote file, when the service names one
    pub file_id: Option<i64>,
    /// Affected file name, when the service names one
    pub name: Option<String>,
}

impl RemoteChange {
    /// A change that does not name any object (e.g. a reconnect)
    pub fn unspecified() -> Self {
        Self {
            file_id: None,
            name: None,
        }
    }
}

/// Port trait for remote change notifications
pub trait IChangeNotifier: Send + Sync {
    /// Returns true while the push channel is connected and authenticated
    fn is_connected(&self) -> bool;

    /// Subscribes to subsequent change notifications
    fn subscribe(&self) -> broadcast::Receiver<RemoteChange>;
}
