pub mod cellular;
pub mod ethernet;
pub mod wireless;

pub use cellular::{CellularTransport, DetachedModem, ModemLink};
pub use ethernet::EthernetTransport;
pub use wireless::WirelessTransport;

use crate::bus::BusError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// The mutually exclusive network uplinks, in fixed failover ring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Ethernet,
    Wireless,
    Cellular,
}

impl TransportKind {
    pub const fn index(self) -> usize {
        match self {
            TransportKind::Ethernet => 0,
            TransportKind::Wireless => 1,
            TransportKind::Cellular => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TransportKind::Ethernet => "ethernet",
            TransportKind::Wireless => "wireless",
            TransportKind::Cellular => "cellular",
        }
    }
}

impl core::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bus access failed: {0}")]
    Bus(#[from] BusError),
    #[error("driver unavailable: {0}")]
    DriverUnavailable(&'static str),
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One network uplink as seen by the failover controller.
///
/// `bring_up`/`tear_down` wrap whatever the underlying driver needs
/// (including a bus lease for bus-attached adapters); `probe` answers the
/// reachability question for the currently active link. Bring-up failure is
/// ordinary: the controller logs it and fails over on the next tick.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    async fn bring_up(&mut self) -> Result<(), TransportError>;

    async fn tear_down(&mut self) -> Result<(), TransportError>;

    /// Network-layer reachability check. `true` means serviceable.
    async fn probe(&mut self) -> bool;
}

/// Well-known external endpoint used for reachability probes.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

/// Bounded connect to the probe target. Any established connection counts;
/// the socket is dropped immediately.
pub(crate) async fn reachability_probe(target: &ProbeTarget) -> bool {
    let attempt = TcpStream::connect((target.host.as_str(), target.port));
    match tokio::time::timeout(target.timeout, attempt).await {
        Ok(Ok(_stream)) => {
            debug!(host = %target.host, port = target.port, "reachability probe ok");
            true
        }
        Ok(Err(e)) => {
            warn!(host = %target.host, port = target.port, error = %e, "reachability probe failed");
            false
        }
        Err(_) => {
            warn!(host = %target.host, port = target.port, "reachability probe timed out");
            false
        }
    }
}
