//! Integration tests for putsync-remote
//!
//! Uses wiremock to simulate the put.io API and upload endpoints, and a
//! local websocket server for the change notifier.

mod common;

mod test_auth;
mod test_files;
mod test_notifier;
mod test_tus;
