use anyhow::Context;
use common::{Environment, config};

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub environment: Environment,
    /// Comma-separated list of position segments to record.
    pub source_addresses: Vec<String>,
    pub output_path: String,
    /// Emit invalid fields too, easing post-hoc sample alignment.
    pub verbose_json: bool,
    pub poll_interval_ms: u64,
}

impl RecorderConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let sources = config::var("SOURCE_ADDRESSES")
            .context("SOURCE_ADDRESSES must list the position segments to record")?;
        let source_addresses: Vec<String> = sources
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        anyhow::ensure!(
            !source_addresses.is_empty(),
            "SOURCE_ADDRESSES must contain at least one address"
        );

        let output_path = config::var("OUTPUT_PATH")
            .context("OUTPUT_PATH must name the JSON-lines file to write")?;

        let verbose_json = config::var_or("VERBOSE_JSON", true);
        let poll_interval_ms = config::var_or("POLL_INTERVAL_MS", 100);

        Ok(Self {
            environment,
            source_addresses,
            output_path,
            verbose_json,
            poll_interval_ms,
        })
    }
}
