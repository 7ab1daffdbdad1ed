use clap::{App, Arg};
use fieldlog::bus::{BusArbiter, BusConfig, BusId};
use fieldlog::clock::WallClock;
use fieldlog::config::LoggerConfig;
use fieldlog::failover::FailoverController;
use fieldlog::pipeline::{read_serial_lines, TcpFrameSender, TelemetryPipeline};
use fieldlog::storage::HourlyArchive;
use fieldlog::transports::{
    CellularTransport, DetachedModem, EthernetTransport, ProbeTarget, Transport, TransportKind,
    WirelessTransport,
};
use std::path::Path;
use tracing::{info, warn};

// Both peripherals hang off the same SPI bus; only the select line differs.
const PERIPHERAL_BUS: BusId = BusId(2);
const NETWORK_SELECT: u8 = 10;
const STORAGE_SELECT: u8 = 38;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("fieldlogd")
        .version("0.1.0")
        .about("📟 Field Data Logger - serial telemetry capture, framing, and delivery")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true)
                .default_value("fieldlog.json"),
        )
        .arg(
            Arg::with_name("device-id")
                .short("d")
                .long("device-id")
                .value_name("ID")
                .help("Override the configured device identity (commissioning/testing)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("transport")
                .short("t")
                .long("transport")
                .value_name("TRANSPORT")
                .help("Pin the initial transport instead of auto-selecting")
                .takes_value(true)
                .possible_values(&["ethernet", "wireless", "cellular"]),
        )
        .get_matches();

    let config_path = Path::new(matches.value_of("config").unwrap_or("fieldlog.json"));
    let config = if config_path.exists() {
        LoggerConfig::load(config_path)?
    } else {
        warn!(path = %config_path.display(), "config file absent, using defaults");
        LoggerConfig::default()
    };

    println!("📟 Field Data Logger");
    println!("====================");

    let arbiter = BusArbiter::new();
    arbiter.initialize_bus(PERIPHERAL_BUS, BusConfig { label: "spi2" })?;
    let network_device = arbiter.register_device(PERIPHERAL_BUS, NETWORK_SELECT)?;
    let storage_device = arbiter.register_device(PERIPHERAL_BUS, STORAGE_SELECT)?;

    let probe = ProbeTarget::new(
        config.probe_host.clone(),
        config.probe_port,
        config.io_timeout(),
    );
    let transports: [Box<dyn Transport>; 3] = [
        Box::new(EthernetTransport::new(
            network_device,
            config.lease_timeout(),
            probe.clone(),
        )),
        Box::new(WirelessTransport::new(probe)),
        Box::new(CellularTransport::new(Box::new(DetachedModem))),
    ];
    let (controller, client) =
        FailoverController::new(transports, config.health_check_period());

    // The wired link is assumed present at boot; driver callbacks keep the
    // latched state current from here on.
    client.on_link_event(TransportKind::Ethernet, true);
    if let Some(name) = matches.value_of("transport") {
        let kind = match name {
            "wireless" => TransportKind::Wireless,
            "cellular" => TransportKind::Cellular,
            _ => TransportKind::Ethernet,
        };
        client.on_link_event(kind, true);
        client.request_override(kind);
    }

    let sender = TcpFrameSender::new(
        config.collector_host.clone(),
        config.collector_port,
        config.io_timeout(),
        config.ack_timeout(),
    );
    let archive = HourlyArchive::new(
        config.archive_root.clone(),
        storage_device,
        config.lease_timeout(),
    );

    let (mut pipeline, line_sink) = TelemetryPipeline::new(
        &config,
        client.connectivity(),
        Box::new(sender),
        Box::new(archive),
        Box::new(WallClock),
    );
    if let Some(id) = matches.value_of("device-id") {
        info!(device_id = id, "device identity overridden from command line");
        pipeline.set_device_id_override(Some(id.to_string()));
    }

    let controller_task = tokio::spawn(controller.run());

    // Serial reader: the sensor link arrives on stdin, one record per line.
    // Lines carry binary payload bytes, so they are read raw, never as text.
    let reader = tokio::spawn(async move {
        read_serial_lines(tokio::io::stdin(), &line_sink).await;
    });

    // Runs until the serial reader drops the last line-queue handle.
    pipeline.run().await;

    reader.abort();
    controller_task.abort();
    println!("📟 Field Data Logger stopped");

    Ok(())
}
