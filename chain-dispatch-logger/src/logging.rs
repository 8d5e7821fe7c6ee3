use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs::File, str::FromStr, sync::Mutex};
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter, Registry};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Plain,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogConfig {
    /// Base level, e.g. "info", "debug", "trace".
    pub level: String,
    /// Extra `EnvFilter` directives, e.g. `chain_dispatch_connector::dispatcher=trace`.
    pub directives: Vec<String>,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Path to the log file, required if output is "file".
    pub file_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            format: LogFormat::Plain,
            output: LogOutput::Stdout,
            file_path: None,
        }
    }
}

/// Builds the filter for `config`. An unknown base level falls back to `info`.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let base = if config.level.eq_ignore_ascii_case("off") {
        LevelFilter::OFF
    } else {
        LevelFilter::from_level(Level::from_str(&config.level).unwrap_or(Level::INFO))
    };

    let mut filter = EnvFilter::new(base.to_string());
    for directive in &config.directives {
        let parsed = directive
            .parse()
            .with_context(|| format!("Invalid log directive '{}'", directive))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Installs the global subscriber described by `config`.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let subscriber = Registry::default().with(filter);

    match config.output {
        LogOutput::File => {
            let file_path = config.file_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("Log output is 'file' but 'file_path' is not specified")
            })?;
            let log_file = File::create(file_path)
                .with_context(|| format!("Failed to create log file '{}'", file_path))?;

            match config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().with_writer(Mutex::new(log_file)).json())
                    .try_init()?,
                LogFormat::Plain => subscriber
                    .with(
                        fmt::layer()
                            .with_writer(Mutex::new(log_file))
                            .with_ansi(false),
                    )
                    .try_init()?,
            }
        }
        LogOutput::Stdout => match config.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).json())
                .try_init()?,
            LogFormat::Plain => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).pretty())
                .try_init()?,
        },
    };

    Ok(())
}

/// Installs a test-writer subscriber at `debug`, ignoring any subscriber a
/// previous test already installed.
pub fn try_init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
