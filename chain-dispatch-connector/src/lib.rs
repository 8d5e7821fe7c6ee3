//! A client-side dispatch layer for a JSON-RPC blockchain node.
//!
//! This crate sits between application code and a node transport. It checks
//! that a resolved target actually implements an operation before invoking
//! it, and reports every outcome through one consistent channel.
//!
//! # Key Components
//!
//! *   [`dispatcher::CapabilityDispatcher`]: Resolves a name to its target, verifies the
//!     operation's interface and dispatches it as a `call` or a `send`.
//! *   [`eventified::EventifiedResult`]: The awaitable, observable result every
//!     dispatch returns.
//! *   [`sync_monitor::SyncStatusMonitor`]: Debounces the node's sync notifications
//!     into a stable "is syncing" signal.
/// Adapts outcomes to legacy error-first callbacks.
pub mod callback;
/// Defines configuration structures for the connector.
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eventified;
/// EIP-137 name hashing.
pub mod namehash;
pub mod operation;
pub mod sync_monitor;
/// Traits for the registry and targets provided by the transport layer.
pub mod transport;
