use anyhow::Context;
use datatypes::Position2D;
use std::io::Write;
use std::net::UdpSocket;

/// Where serialized positions go: a UDP peer or standard output.
pub enum PositionSender {
    Udp(UdpSocket),
    Stdout,
}

impl PositionSender {
    pub fn from_endpoint(endpoint: Option<&str>) -> anyhow::Result<Self> {
        match endpoint {
            Some(peer) => {
                let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind UDP socket")?;
                socket
                    .connect(peer)
                    .with_context(|| format!("Failed to set UDP peer '{peer}'"))?;
                tracing::info!(peer, "Sending positions over UDP");
                Ok(PositionSender::Udp(socket))
            }
            None => {
                tracing::info!("Sending positions to stdout");
                Ok(PositionSender::Stdout)
            }
        }
    }

    pub fn send(&mut self, position: &Position2D) -> anyhow::Result<()> {
        let line = serde_json::to_string(&position.record(false))
            .context("Failed to serialize position")?;
        match self {
            PositionSender::Udp(socket) => {
                socket
                    .send(line.as_bytes())
                    .context("Failed to send position datagram")?;
            }
            PositionSender::Stdout => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{line}").context("Failed to write position to stdout")?;
            }
        }
        Ok(())
    }
}
