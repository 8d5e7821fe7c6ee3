#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The top-level configuration for the `chain-dispatch-connector` library.
///
/// A single instance is shared (behind an `Arc`) by the dispatcher and read at
/// dispatch time, so every operation sees the same defaults without each one
/// carrying its own copy.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ConnectorConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub node: Node,
    #[cfg_attr(feature = "serde", serde(default))]
    pub transaction: TransactionDefaults,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sync: SyncMonitorConfig,
}

/// Endpoints of the remote node. The transport collaborator owns the actual connection.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Node {
    pub rpc_url: String,
    pub ws_url: String,
}

/// Defaults applied to every dispatched operation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct TransactionDefaults {
    /// Block tag attached to read-only calls, e.g. `"latest"` or `"pending"`.
    pub default_block: String,
    /// Sender used for state-changing operations when the caller gives none.
    pub default_account: Option<String>,
    /// Number of confirmations the transport reports before it stops watching a transaction.
    pub confirmation_blocks: u64,
    /// Number of blocks to wait for a receipt over a subscription transport.
    pub block_timeout: u64,
    /// Seconds to wait for a receipt over a polling transport.
    pub polling_timeout_secs: u64,
    /// Seconds between receipt polls.
    pub polling_interval_secs: u64,
    /// Ask the transport to decode revert reasons.
    pub handle_revert: bool,
}

/// Tuning for the `SyncStatusMonitor`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct SyncMonitorConfig {
    /// Quiet period after the last snapshot before "caught up" is evaluated.
    pub debounce_ms: u64,
    /// A node within this many blocks of the highest known block counts as caught up.
    pub catch_up_threshold: u64,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            ws_url: "ws://127.0.0.1:8546".to_string(),
        }
    }
}

impl Default for TransactionDefaults {
    fn default() -> Self {
        Self {
            default_block: "latest".to_string(),
            default_account: None,
            confirmation_blocks: 24,
            block_timeout: 50,
            polling_timeout_secs: 750,
            polling_interval_secs: 1,
            handle_revert: false,
        }
    }
}

impl Default for SyncMonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            catch_up_threshold: 200,
        }
    }
}

/// Errors raised while loading a [`ConnectorConfig`].
#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to build configuration from '{path}': {source}")]
    Build {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("Failed to deserialize configuration: {0}")]
    Deserialize(#[source] config::ConfigError),
}

#[cfg(feature = "serde")]
impl ConnectorConfig {
    /// Loads the configuration from a TOML file, with `CHAIN_DISPATCH__*`
    /// environment variables taking precedence.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CHAIN_DISPATCH").separator("__"));

        builder
            .build()
            .map_err(|source| ConfigError::Build {
                path: path.to_string(),
                source,
            })?
            .try_deserialize()
            .map_err(ConfigError::Deserialize)
    }
}
