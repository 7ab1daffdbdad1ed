use crate::transports::{Transport, TransportKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{info, warn};

const CONTROL_EVENT_QUEUE_DEPTH: usize = 16;

/// Fixed automatic failover order. Transitions wrap around.
pub const RING: [TransportKind; 3] = [
    TransportKind::Ethernet,
    TransportKind::Wireless,
    TransportKind::Cellular,
];

pub const fn next_in_ring(kind: TransportKind) -> TransportKind {
    RING[(kind.index() + 1) % RING.len()]
}

/// Events fed to the controller by transport drivers and the configuration
/// surface. Latched, then consumed at the top of each control-loop tick.
#[derive(Debug, Clone, Copy)]
pub enum ControlEvent {
    /// Link-level status from a transport's own driver layer
    /// (link-up/link-down, association/disassociation).
    Link { kind: TransportKind, up: bool },
    /// Manual transport selection; honored before automatic failover on the
    /// next tick, regardless of ring order.
    Override(TransportKind),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ControllerStats {
    pub failovers: u32,
    pub bring_up_failures: u32,
    pub probe_failures: u32,
    pub overrides_honored: u32,
}

/// Cloneable handle for everything outside the controller: event injection
/// and connectivity reads. No other component mutates transport state.
#[derive(Clone)]
pub struct ControllerClient {
    events: mpsc::Sender<ControlEvent>,
    connected: watch::Receiver<bool>,
}

impl ControllerClient {
    pub fn on_link_event(&self, kind: TransportKind, up: bool) {
        if self
            .events
            .try_send(ControlEvent::Link { kind, up })
            .is_err()
        {
            warn!(%kind, up, "control event queue full, link event dropped");
        }
    }

    pub fn request_override(&self, kind: TransportKind) {
        if self.events.try_send(ControlEvent::Override(kind)).is_err() {
            warn!(%kind, "control event queue full, override dropped");
        }
    }

    /// True only while the active transport reports link-up and its most
    /// recent reachability probe succeeded.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch handle over the connectivity flag, for components that gate
    /// their own work on it.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }
}

/// Selects, starts, monitors, and tears down network transports.
///
/// Runs a periodic health check over the active transport: link status
/// first (cheap, latched from driver events), then a reachability probe.
/// Either failing moves the controller to the next ring member. Bring-up
/// failure is logged and surfaces as "unhealthy", triggering failover on
/// the following tick; it never terminates the loop.
pub struct FailoverController {
    transports: [Box<dyn Transport>; 3],
    /// `None` until the startup auto-selection has run.
    active: Option<TransportKind>,
    link_up: [bool; 3],
    probe_ok: bool,
    pending_override: Option<TransportKind>,
    events: mpsc::Receiver<ControlEvent>,
    connected_tx: watch::Sender<bool>,
    period: Duration,
    stats: ControllerStats,
}

impl FailoverController {
    /// `transports` must be supplied in ring order.
    pub fn new(transports: [Box<dyn Transport>; 3], period: Duration) -> (Self, ControllerClient) {
        for (index, transport) in transports.iter().enumerate() {
            assert_eq!(
                transport.kind().index(),
                index,
                "transports must be supplied in ring order"
            );
        }
        let (events_tx, events_rx) = mpsc::channel(CONTROL_EVENT_QUEUE_DEPTH);
        let (connected_tx, connected_rx) = watch::channel(false);
        let controller = Self {
            transports,
            active: None,
            link_up: [false; 3],
            probe_ok: false,
            pending_override: None,
            events: events_rx,
            connected_tx,
            period,
            stats: ControllerStats::default(),
        };
        let client = ControllerClient {
            events: events_tx,
            connected: connected_rx,
        };
        (controller, client)
    }

    pub fn active(&self) -> Option<TransportKind> {
        self.active
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    /// Periodic control loop. Never returns under normal operation.
    pub async fn run(mut self) {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.step().await;
        }
    }

    /// One health-check iteration: consume latched events, honor overrides,
    /// then evaluate the active transport and fail over if unhealthy.
    pub async fn step(&mut self) {
        self.drain_events();

        if let Some(requested) = self.pending_override.take() {
            if self.active != Some(requested) {
                info!(%requested, "manual transport override");
                self.stats.overrides_honored += 1;
                self.switch_to(requested).await;
            }
            self.publish();
            return;
        }

        let active = match self.active {
            Some(kind) => kind,
            None => {
                let initial = self.select_initial();
                info!(%initial, "auto-selecting initial transport");
                self.switch_to(initial).await;
                self.publish();
                return;
            }
        };

        if !self.link_up[active.index()] {
            self.probe_ok = false;
            self.publish();
            warn!(%active, "link down, failing over");
            self.fail_over(active).await;
            return;
        }

        let serviceable = self.transports[active.index()].probe().await;
        self.probe_ok = serviceable;
        self.publish();
        if !serviceable {
            self.stats.probe_failures += 1;
            warn!(%active, "reachability probe failed, failing over");
            self.fail_over(active).await;
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ControlEvent::Link { kind, up } => {
                    self.link_up[kind.index()] = up;
                }
                ControlEvent::Override(kind) => {
                    self.pending_override = Some(kind);
                }
            }
        }
    }

    /// Startup selection: first ring member with a latched link, else the
    /// head of the ring.
    fn select_initial(&self) -> TransportKind {
        RING.iter()
            .copied()
            .find(|kind| self.link_up[kind.index()])
            .unwrap_or(RING[0])
    }

    async fn fail_over(&mut self, from: TransportKind) {
        self.stats.failovers += 1;
        self.switch_to(next_in_ring(from)).await;
    }

    /// Tear down the previous transport, then bring up the new one. A
    /// bring-up failure marks the new transport link-down so the next tick
    /// moves on around the ring.
    async fn switch_to(&mut self, kind: TransportKind) {
        if let Some(previous) = self.active {
            if let Err(e) = self.transports[previous.index()].tear_down().await {
                warn!(transport = %previous, error = %e, "teardown failed");
            }
        }

        self.active = Some(kind);
        self.probe_ok = false;

        match self.transports[kind.index()].bring_up().await {
            Ok(()) => info!(transport = %kind, "transport up"),
            Err(e) => {
                self.stats.bring_up_failures += 1;
                self.link_up[kind.index()] = false;
                warn!(transport = %kind, error = %e, "bring-up failed, transport unhealthy");
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let connected = self
            .active
            .is_some_and(|kind| self.link_up[kind.index()] && self.probe_ok);
        self.connected_tx.send_replace(connected);
    }
}
