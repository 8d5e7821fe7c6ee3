use thiserror::Error;

/// Errors raised by the transport collaborator (the node connection).
///
/// The dispatcher never inspects or wraps these beyond carrying them to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transaction stream closed before a receipt was received")]
    StreamClosed,
}

/// Defines the failures a dispatched operation can end with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The registry could not produce a target for the name.
    #[error("Failed to resolve target for '{name}': {source}")]
    Resolution {
        name: String,
        #[source]
        source: TransportError,
    },

    /// The target did not confirm support for the operation's interface.
    ///
    /// This variant covers both an explicit `false` from the target and a
    /// failed introspection call: a target that could not be asked is treated
    /// exactly like one that said no, and the two cases are not distinguished.
    #[error("The target at '{address}' does not implement '{operation}'")]
    CapabilityNotSupported { address: String, operation: String },

    /// The dispatched call or send failed in the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The outcome was handed to the completion callback instead of the
    /// awaitable side, which therefore never settles on its own.
    #[error("The result was delivered to the completion callback")]
    Detached,
}
