use heapless::Vec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

pub const MAX_BUSES: usize = 4;

/// Identifier of one physical shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(pub u8);

impl core::fmt::Display for BusId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "bus{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BusConfig {
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus {0} is not initialized")]
    NotInitialized(BusId),
    #[error("bus registry full")]
    RegistryFull,
    #[error("timed out waiting for bus ownership")]
    TimedOut,
}

#[derive(Debug)]
struct BusShared {
    id: BusId,
    label: &'static str,
    // One permit: at most one lease outstanding per bus.
    lock: Arc<Semaphore>,
    active_selector: Mutex<Option<u8>>,
}

struct BusEntry {
    id: BusId,
    shared: Arc<BusShared>,
}

/// Exclusive-access broker for buses shared by multiple peripherals.
///
/// Each peripheral registers once at startup and receives a [`DeviceHandle`];
/// every transaction on the bus must run under a [`BusLease`] acquired
/// through that handle. Waiters either obtain the lease or time out; they
/// never hang.
#[derive(Clone, Default)]
pub struct BusArbiter {
    buses: Arc<Mutex<Vec<BusEntry, MAX_BUSES>>>,
}

impl BusArbiter {
    pub fn new() -> Self {
        Self {
            buses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Initializes a bus. Idempotent: peripherals that share the bus may each
    /// call this from their own startup path.
    pub fn initialize_bus(&self, id: BusId, config: BusConfig) -> Result<(), BusError> {
        let mut buses = self.buses.lock().unwrap();
        if buses.iter().any(|b| b.id == id) {
            debug!(%id, "bus already initialized");
            return Ok(());
        }
        let shared = Arc::new(BusShared {
            id,
            label: config.label,
            lock: Arc::new(Semaphore::new(1)),
            active_selector: Mutex::new(None),
        });
        buses
            .push(BusEntry { id, shared })
            .map_err(|_| BusError::RegistryFull)?;
        debug!(%id, label = config.label, "bus initialized");
        Ok(())
    }

    /// Registers a peripheral on an initialized bus and parks its select
    /// line at the inactive default.
    pub fn register_device(&self, id: BusId, selector: u8) -> Result<DeviceHandle, BusError> {
        let buses = self.buses.lock().unwrap();
        let entry = buses
            .iter()
            .find(|b| b.id == id)
            .ok_or(BusError::NotInitialized(id))?;
        debug!(%id, selector, "device registered, select line inactive");
        Ok(DeviceHandle {
            selector,
            shared: Arc::clone(&entry.shared),
        })
    }
}

/// Registration record binding one peripheral to its bus and select line.
/// Created once at startup, lives for the process lifetime.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    selector: u8,
    shared: Arc<BusShared>,
}

impl DeviceHandle {
    pub fn bus(&self) -> BusId {
        self.shared.id
    }

    pub fn selector(&self) -> u8 {
        self.selector
    }

    /// Waits up to `timeout` for exclusive ownership of the bus. On success
    /// the device's select line is activated for the life of the lease.
    ///
    /// A timeout means "operation deferred", not a fault; the caller decides
    /// whether to retry, skip, or escalate.
    pub async fn acquire(&self, timeout: Duration) -> Result<BusLease, BusError> {
        let lock = Arc::clone(&self.shared.lock);
        let permit = tokio::time::timeout(timeout, lock.acquire_owned())
            .await
            .map_err(|_| BusError::TimedOut)?
            .expect("bus semaphore closed");

        {
            let mut active = self.shared.active_selector.lock().unwrap();
            debug_assert!(
                active.is_none(),
                "select line {:?} still active while acquiring {} on {}",
                *active,
                self.selector,
                self.shared.id,
            );
            *active = Some(self.selector);
        }
        debug!(bus = %self.shared.id, selector = self.selector, "bus lease acquired");

        Ok(BusLease {
            permit: Some(permit),
            selector: self.selector,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Exclusive ownership of a bus by one device. At most one lease is
/// outstanding per bus at any instant.
///
/// `release` consumes the lease, so releasing twice does not compile. A
/// lease dropped without an explicit release still frees the bus, with a
/// warning, so a panicking critical section cannot wedge the arbiter.
#[derive(Debug)]
pub struct BusLease {
    permit: Option<OwnedSemaphorePermit>,
    selector: u8,
    shared: Arc<BusShared>,
}

impl BusLease {
    pub fn release(mut self) {
        self.deactivate();
        debug!(bus = %self.shared.id, selector = self.selector, "bus lease released");
    }

    fn deactivate(&mut self) {
        {
            let mut active = self.shared.active_selector.lock().unwrap();
            *active = None;
        }
        // Dropping the permit unblocks the next waiter.
        self.permit.take();
    }
}

impl Drop for BusLease {
    fn drop(&mut self) {
        if self.permit.is_some() {
            warn!(
                bus = %self.shared.id,
                label = self.shared.label,
                selector = self.selector,
                "bus lease dropped without explicit release"
            );
            self.deactivate();
        }
    }
}
