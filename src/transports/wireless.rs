use super::{reachability_probe, ProbeTarget, Transport, TransportError, TransportKind};
use async_trait::async_trait;
use tracing::{info, warn};

/// Wireless uplink. The radio has its own controller and does not sit on
/// the shared peripheral bus; association/disassociation reach the failover
/// controller as latched link events.
pub struct WirelessTransport {
    probe: ProbeTarget,
    started: bool,
}

impl WirelessTransport {
    pub fn new(probe: ProbeTarget) -> Self {
        Self {
            probe,
            started: false,
        }
    }
}

#[async_trait]
impl Transport for WirelessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Wireless
    }

    async fn bring_up(&mut self) -> Result<(), TransportError> {
        if self.started {
            warn!("wireless already started");
            return Ok(());
        }
        info!("wireless radio enabled, association requested");
        self.started = true;
        Ok(())
    }

    async fn tear_down(&mut self) -> Result<(), TransportError> {
        if !self.started {
            return Ok(());
        }
        info!("wireless radio disabled");
        self.started = false;
        Ok(())
    }

    async fn probe(&mut self) -> bool {
        reachability_probe(&self.probe).await
    }
}
