use fieldlog::bus::{BusArbiter, BusConfig, BusId, DeviceHandle};
use fieldlog::clock::FixedClock;
use fieldlog::config::LoggerConfig;
use fieldlog::pipeline::{TcpFrameSender, TelemetryPipeline};
use fieldlog::storage::HourlyArchive;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

const EXPECTED_FRAME: &str = "$DL-0042$24/08/01-12:08:31$2$21.50$63.00$\r\n";

fn storage_device() -> DeviceHandle {
    let arbiter = BusArbiter::new();
    arbiter
        .initialize_bus(BusId(2), BusConfig { label: "spi2" })
        .unwrap();
    arbiter.register_device(BusId(2), 38).unwrap()
}

fn raw_line() -> Vec<u8> {
    let mut line = b"$R0 240801120831 ".to_vec();
    line.extend_from_slice(&21.5f32.to_be_bytes());
    line.extend_from_slice(&63.0f32.to_be_bytes());
    line.push(b'&');
    line
}

/// One-shot collector: accepts a single connection, reads the whole frame,
/// acknowledges, and hands the frame back.
async fn spawn_collector() -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut frame = Vec::new();
        stream.read_to_end(&mut frame).await.unwrap();
        stream.write_all(b"$SEND$").await.unwrap();
        frame
    });
    (port, task)
}

fn pipeline_for(
    port: u16,
    device: DeviceHandle,
    archive_root: &std::path::Path,
    connected: bool,
) -> (TelemetryPipeline, watch::Sender<bool>) {
    let config = LoggerConfig {
        device_id: "DL-0042".into(),
        total_channels: 2,
        ..LoggerConfig::default()
    };
    let sender = TcpFrameSender::new(
        "127.0.0.1",
        port,
        Duration::from_secs(2),
        Duration::from_secs(2),
    );
    let archive = HourlyArchive::new(archive_root, device, Duration::from_millis(100));
    let (connected_tx, connected_rx) = watch::channel(connected);
    let (pipeline, line_sink) = TelemetryPipeline::new(
        &config,
        connected_rx,
        Box::new(sender),
        Box::new(archive),
        Box::new(FixedClock::new(2024, 8, 1, 12, 8, 31)),
    );
    drop(line_sink);
    (pipeline, connected_tx)
}

#[tokio::test]
async fn test_frame_reaches_collector_and_archive() {
    let (port, collector) = spawn_collector().await;
    let root = tempfile::tempdir().unwrap();
    let (mut pipeline, _connected_tx) = pipeline_for(port, storage_device(), root.path(), true);

    let report = pipeline.process_line(&raw_line()).await.unwrap();
    assert!(report.network_delivered);
    assert!(report.archived);

    let received = collector.await.unwrap();
    assert_eq!(String::from_utf8_lossy(&received), EXPECTED_FRAME);

    let path = root.path().join("2024").join("08").join("01").join("12.log");
    let contents = std::fs::read_to_string(path).unwrap();
    assert_eq!(contents, EXPECTED_FRAME);
}

#[tokio::test]
async fn test_unreachable_collector_still_archives() {
    // Bind then drop to get a port nothing is listening on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let root = tempfile::tempdir().unwrap();
    let (mut pipeline, _connected_tx) = pipeline_for(port, storage_device(), root.path(), true);

    let report = pipeline.process_line(&raw_line()).await.unwrap();
    assert!(!report.network_delivered);
    assert!(report.archived);

    let path = root.path().join("2024").join("08").join("01").join("12.log");
    assert_eq!(std::fs::read_to_string(path).unwrap(), EXPECTED_FRAME);
}
