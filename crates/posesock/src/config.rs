use anyhow::Context;
use common::{Environment, config};

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub environment: Environment,
    pub source_address: String,
    /// UDP `host:port` to send JSON datagrams to; stdout when unset.
    pub endpoint: Option<String>,
    pub poll_interval_ms: u64,
}

impl SocketConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let source_address = config::var("SOURCE_ADDRESS")
            .context("SOURCE_ADDRESS must name the position segment to read")?;

        let endpoint = config::var("UDP_ENDPOINT");
        let poll_interval_ms = config::var_or("POLL_INTERVAL_MS", 100);

        Ok(Self {
            environment,
            source_address,
            endpoint,
            poll_interval_ms,
        })
    }
}
