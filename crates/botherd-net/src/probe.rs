//! Liveness probing.
//!
//! A probe opens a bare TCP connection and drops it straight away, without
//! speaking any game protocol. It is much cheaper than a failed handshake
//! and lets callers skip servers that are asleep or down.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Returns `true` only when a TCP connection to `host:port` is fully
/// established within `limit`. Resolution failures, refusals and timeouts
/// all yield `false`.
pub async fn probe(host: &str, port: u16, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            debug!(host, port, "Probe succeeded");
            true
        }
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "Probe failed");
            false
        }
        Err(_) => {
            debug!(host, port, timeout_ms = limit.as_millis() as u64, "Probe timed out");
            false
        }
    }
}
