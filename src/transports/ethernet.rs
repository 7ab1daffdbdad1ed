use super::{reachability_probe, ProbeTarget, Transport, TransportError, TransportKind};
use crate::bus::DeviceHandle;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Wired adapter sharing the peripheral bus with the storage card.
///
/// The MAC/PHY chip itself is driven by an external bring-up routine; what
/// matters here is that both bring-up and teardown touch the shared bus and
/// therefore run under a bus lease.
pub struct EthernetTransport {
    handle: DeviceHandle,
    lease_timeout: Duration,
    probe: ProbeTarget,
    started: bool,
}

impl EthernetTransport {
    pub fn new(handle: DeviceHandle, lease_timeout: Duration, probe: ProbeTarget) -> Self {
        Self {
            handle,
            lease_timeout,
            probe,
            started: false,
        }
    }
}

#[async_trait]
impl Transport for EthernetTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ethernet
    }

    async fn bring_up(&mut self) -> Result<(), TransportError> {
        if self.started {
            warn!("ethernet already started");
            return Ok(());
        }
        let lease = self.handle.acquire(self.lease_timeout).await?;
        info!(bus = %self.handle.bus(), "ethernet adapter reset and started");
        lease.release();
        self.started = true;
        Ok(())
    }

    async fn tear_down(&mut self) -> Result<(), TransportError> {
        if !self.started {
            return Ok(());
        }
        let lease = self.handle.acquire(self.lease_timeout).await?;
        info!(bus = %self.handle.bus(), "ethernet adapter stopped, select line parked");
        lease.release();
        self.started = false;
        Ok(())
    }

    async fn probe(&mut self) -> bool {
        reachability_probe(&self.probe).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusArbiter, BusConfig, BusError, BusId};

    const TEST_BUS: BusId = BusId(2);
    const NETWORK_SELECT: u8 = 10;
    const STORAGE_SELECT: u8 = 38;

    fn transport_with_neighbor() -> (EthernetTransport, DeviceHandle) {
        let arbiter = BusArbiter::new();
        arbiter
            .initialize_bus(TEST_BUS, BusConfig { label: "spi2" })
            .unwrap();
        let network = arbiter.register_device(TEST_BUS, NETWORK_SELECT).unwrap();
        let storage = arbiter.register_device(TEST_BUS, STORAGE_SELECT).unwrap();
        let probe = ProbeTarget::new("127.0.0.1", 1, Duration::from_millis(10));
        let transport = EthernetTransport::new(network, Duration::from_millis(20), probe);
        (transport, storage)
    }

    #[tokio::test]
    async fn test_bring_up_defers_while_bus_is_held() {
        let (mut transport, storage) = transport_with_neighbor();

        let held = storage.acquire(Duration::from_millis(100)).await.unwrap();
        match transport.bring_up().await {
            Err(TransportError::Bus(BusError::TimedOut)) => {}
            other => panic!("expected bus timeout, got {other:?}"),
        }
        held.release();

        transport.bring_up().await.unwrap();
    }

    #[tokio::test]
    async fn test_tear_down_also_runs_under_a_lease() {
        let (mut transport, storage) = transport_with_neighbor();
        transport.bring_up().await.unwrap();

        let held = storage.acquire(Duration::from_millis(100)).await.unwrap();
        match transport.tear_down().await {
            Err(TransportError::Bus(BusError::TimedOut)) => {}
            other => panic!("expected bus timeout, got {other:?}"),
        }
        held.release();

        transport.tear_down().await.unwrap();

        // Teardown of an already-stopped adapter touches no bus state.
        let held = storage.acquire(Duration::from_millis(100)).await.unwrap();
        transport.tear_down().await.unwrap();
        held.release();
    }
}
