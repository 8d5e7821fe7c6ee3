//! Interfaces to the external collaborators the dispatcher sits in front of.
//!
//! The registry and the resolved targets are implemented by the transport
//! layer (an HTTP or WebSocket provider plus contract bindings). Keeping them
//! behind traits lets the dispatcher run against a live node or an in-memory
//! double in tests.

use crate::{config::TransactionDefaults, error::TransportError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::{fmt, sync::Arc};

/// A transaction receipt as returned by the node.
pub type Receipt = Value;

/// A 4-byte interface identifier (ERC-165 selector).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub [u8; 4]);

impl InterfaceId {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterfaceId({})", self.to_hex())
    }
}

/// A fully prepared method invocation handed to a [`Target`].
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    /// Arguments in call order, the name's node first.
    pub args: Vec<Value>,
    /// Block tag for read-only calls.
    pub block: String,
}

/// Options for a state-changing invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub from: Option<String>,
    pub gas: Option<u64>,
    pub gas_price: Option<String>,
    pub value: Option<String>,
    pub confirmation_blocks: Option<u64>,
    pub block_timeout: Option<u64>,
    pub polling_timeout_secs: Option<u64>,
    pub polling_interval_secs: Option<u64>,
    pub handle_revert: Option<bool>,
}

impl SendOptions {
    /// Fills every unset field from the shared transaction defaults.
    pub fn with_defaults(mut self, defaults: &TransactionDefaults) -> Self {
        if self.from.is_none() {
            self.from = defaults.default_account.clone();
        }
        self.confirmation_blocks.get_or_insert(defaults.confirmation_blocks);
        self.block_timeout.get_or_insert(defaults.block_timeout);
        self.polling_timeout_secs
            .get_or_insert(defaults.polling_timeout_secs);
        self.polling_interval_secs
            .get_or_insert(defaults.polling_interval_secs);
        self.handle_revert.get_or_insert(defaults.handle_revert);
        self
    }
}

/// Lifecycle notifications produced by the transport while a transaction is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum SendEvent {
    Sending,
    Sent,
    TransactionHash(String),
    Confirmation { number: u64, receipt: Receipt },
    Receipt(Receipt),
    Error(TransportError),
}

/// A resolved contract that handles dispatched operations.
#[async_trait]
pub trait Target: Send + Sync {
    /// The on-chain address of the target, used for diagnostics.
    fn address(&self) -> &str;

    /// Asks the target whether it implements `interface_id`.
    async fn supports_interface(&self, interface_id: InterfaceId) -> Result<bool, TransportError>;

    /// Executes a read-only call and returns the raw decoded result.
    async fn call(&self, request: MethodCall) -> Result<Value, TransportError>;

    /// Submits a state-changing invocation and streams its lifecycle.
    fn send(&self, request: MethodCall, options: SendOptions) -> BoxStream<'static, SendEvent>;
}

/// Looks up the target currently responsible for a name.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolves `name` to its target. Fails if the name is unregistered or the
    /// registry call itself fails.
    async fn resolver(&self, name: &str) -> Result<Arc<dyn Target>, TransportError>;
}
