use super::{Transport, TransportError, TransportKind};
use async_trait::async_trait;
use tracing::{info, warn};

/// External modem collaborator. Actual AT-command bring-up lives outside
/// this crate; the transport only needs attach/detach/reachable.
#[async_trait]
pub trait ModemLink: Send {
    async fn attach(&mut self) -> Result<(), TransportError>;

    async fn detach(&mut self) -> Result<(), TransportError>;

    async fn reachable(&mut self) -> bool;
}

/// Placeholder modem for builds without cellular hardware wired in.
/// Attach always fails, so the controller treats cellular as an unhealthy
/// ring member and keeps cycling.
#[derive(Debug, Default)]
pub struct DetachedModem;

#[async_trait]
impl ModemLink for DetachedModem {
    async fn attach(&mut self) -> Result<(), TransportError> {
        Err(TransportError::DriverUnavailable("no modem attached"))
    }

    async fn detach(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn reachable(&mut self) -> bool {
        false
    }
}

/// Cellular uplink: a full ring member with the same contract as the wired
/// and wireless transports, delegating to the modem collaborator.
pub struct CellularTransport {
    modem: Box<dyn ModemLink>,
    started: bool,
}

impl CellularTransport {
    pub fn new(modem: Box<dyn ModemLink>) -> Self {
        Self {
            modem,
            started: false,
        }
    }
}

#[async_trait]
impl Transport for CellularTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Cellular
    }

    async fn bring_up(&mut self) -> Result<(), TransportError> {
        if self.started {
            warn!("cellular already started");
            return Ok(());
        }
        self.modem.attach().await?;
        info!("cellular modem attached");
        self.started = true;
        Ok(())
    }

    async fn tear_down(&mut self) -> Result<(), TransportError> {
        if !self.started {
            return Ok(());
        }
        self.modem.detach().await?;
        info!("cellular modem detached");
        self.started = false;
        Ok(())
    }

    async fn probe(&mut self) -> bool {
        self.modem.reachable().await
    }
}
