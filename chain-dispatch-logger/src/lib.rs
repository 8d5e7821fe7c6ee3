//! Logging setup shared by services built on `chain-dispatch-connector`.
pub mod logging;

pub use logging::{init, try_init_for_tests, LogConfig, LogFormat, LogOutput};
