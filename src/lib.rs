//! # Field Data Logger
//!
//! Firmware-style library for a field data-logging device: sensor nodes
//! stream readings over a serial link, and the logger parses, frames, and
//! fans each record out to a network collector and a local storage card.
//!
//! ## Features
//!
//! - **Bus arbitration**: Exclusive leases over the shared peripheral bus
//! - **Transport failover**: Ethernet, wireless, and cellular uplinks cycled
//!   by a periodic health check
//! - **Telemetry pipeline**: Bounded line queue, prefix-tagged record
//!   parsing, and `$`-delimited frame building
//! - **Durable archive**: Hour-granularity log files under a date hierarchy
//! - **Embedded-friendly**: Bounded buffers and queues throughout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fieldlog::bus::{BusArbiter, BusConfig, BusId};
//!
//! # async fn demo() -> Result<(), fieldlog::bus::BusError> {
//! let arbiter = BusArbiter::new();
//! arbiter.initialize_bus(BusId(2), BusConfig { label: "spi2" })?;
//! let storage = arbiter.register_device(BusId(2), 38)?;
//!
//! let lease = storage.acquire(std::time::Duration::from_millis(100)).await?;
//! // ... talk to the storage card ...
//! lease.release();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`bus`] - Shared peripheral bus arbiter and device leases
//! - [`codec`] - Serial record parsing and frame building
//! - [`pipeline`] - Line queue and dual-sink delivery
//! - [`transports`] - Ethernet, wireless, and cellular uplink drivers
//! - [`failover`] - Periodic health check and active-transport selection
//! - [`storage`] - Hourly archive on the storage card
//! - [`clock`] - Timestamp and date-stamp sources
//! - [`config`] - On-disk logger configuration

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::similar_names)]
#![allow(clippy::float_cmp)]
#![allow(clippy::cast_precision_loss)]

pub mod bus;
pub mod clock;
pub mod codec;
pub mod config;
pub mod failover;
pub mod pipeline;
pub mod storage;
pub mod transports;

// Re-export main public types for convenience
pub use bus::{BusArbiter, BusConfig, BusId, BusLease, DeviceHandle};
pub use codec::{parse_record, SensorMap, SensorRecord};
pub use failover::{ControllerClient, FailoverController};
pub use pipeline::{LineSink, TelemetryPipeline};
