use crate::clock::TimeSource;
use crate::codec::{build_frame, parse_record, FrameBuffer, SensorMap};
use crate::config::LoggerConfig;
use crate::storage::FrameStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Upper bound on one serial line, terminator excluded.
pub const MAX_LINE_BYTES: usize = 1024;

pub type LineBuffer = heapless::Vec<u8, MAX_LINE_BYTES>;

/// Producer side of the line queue, handed to the serial reader.
///
/// Enqueue never blocks: oversized lines and lines that would overflow the
/// queue are dropped whole with a warning.
#[derive(Clone)]
pub struct LineSink {
    tx: mpsc::Sender<LineBuffer>,
    max_line_bytes: usize,
}

impl LineSink {
    pub fn bind(tx: mpsc::Sender<LineBuffer>, max_line_bytes: usize) -> Self {
        Self {
            tx,
            max_line_bytes: max_line_bytes.min(MAX_LINE_BYTES),
        }
    }

    /// Offers one complete line (terminator stripped). Returns whether the
    /// line was accepted into the queue.
    pub fn push_line(&self, line: &[u8]) -> bool {
        if line.is_empty() {
            return false;
        }
        if line.len() >= self.max_line_bytes {
            warn!(len = line.len(), max = self.max_line_bytes, "oversized line dropped");
            return false;
        }
        let buffer = match LineBuffer::from_slice(line) {
            Ok(buffer) => buffer,
            Err(()) => {
                warn!(len = line.len(), "line exceeds queue buffer, dropped");
                return false;
            }
        };
        match self.tx.try_send(buffer) {
            Ok(()) => true,
            Err(_) => {
                warn!("line queue full, line dropped");
                false
            }
        }
    }
}

/// Drains a raw serial byte stream into the line sink, one `\n`-terminated
/// line at a time with CR/LF stripped.
///
/// Lines are byte sequences, not text: the payload section carries raw
/// big-endian floats, so no encoding is assumed. Read errors are logged and
/// skipped; the loop ends only when the stream does.
pub async fn read_serial_lines<R>(reader: R, sink: &LineSink)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_LINE_BYTES);
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                info!("serial input closed");
                break;
            }
            Ok(_) => {
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                sink.push_line(&line);
            }
            Err(e) => {
                warn!(error = %e, "serial read error, line skipped");
            }
        }
    }
}

/// Network sink for built frames. Delivery failure is a boolean outcome,
/// never an abort.
#[async_trait]
pub trait FrameSink: Send {
    async fn deliver(&mut self, frame: &[u8]) -> bool;
}

/// One TCP connection per frame: connect, send, half-close the write side,
/// wait briefly for an opaque acknowledgement, close. No connection reuse.
pub struct TcpFrameSender {
    host: String,
    port: u16,
    io_timeout: Duration,
    ack_timeout: Duration,
}

impl TcpFrameSender {
    pub fn new(host: impl Into<String>, port: u16, io_timeout: Duration, ack_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            io_timeout,
            ack_timeout,
        }
    }
}

#[async_trait]
impl FrameSink for TcpFrameSender {
    async fn deliver(&mut self, frame: &[u8]) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let mut stream = match timeout(self.io_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(host = %self.host, port = self.port, error = %e, "collector connect failed");
                return false;
            }
            Err(_) => {
                warn!(host = %self.host, port = self.port, "collector connect timed out");
                return false;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not set TCP_NODELAY");
        }

        match timeout(self.io_timeout, stream.write_all(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "frame send failed");
                return false;
            }
            Err(_) => {
                warn!("frame send timed out");
                return false;
            }
        }

        // Half-close: tells the collector the frame is complete.
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "write-side shutdown failed");
        }

        // The response (typically "$SEND$") is an opaque acknowledgement:
        // logged, not validated.
        let mut response = [0u8; 64];
        match timeout(self.ack_timeout, stream.read(&mut response)).await {
            Ok(Ok(n)) if n > 0 => {
                info!(response = %String::from_utf8_lossy(&response[..n]).trim(), "collector response");
            }
            Ok(_) => debug!("collector closed without response"),
            Err(_) => debug!("no collector response within ack timeout"),
        }

        true
    }
}

/// Network/storage outcome of one frame. The network result is the
/// pipeline's reported outcome; the archive is best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub network_delivered: bool,
    pub archived: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PipelineStats {
    pub lines_received: u32,
    pub lines_rejected: u32,
    pub frame_overflows: u32,
    pub network_delivered: u32,
    pub network_failed: u32,
    pub network_skipped: u32,
    pub archived: u32,
    pub archive_failed: u32,
}

/// Bridges serial ingestion to dual-sink delivery.
///
/// Each dequeued line is parsed, stamped, framed, then fanned out: the
/// network sink runs only while the transport controller reports
/// connectivity, and the storage sink is attempted regardless of the
/// network outcome.
pub struct TelemetryPipeline {
    lines: mpsc::Receiver<LineBuffer>,
    sensor_map: SensorMap,
    total_channels: usize,
    device_id: String,
    device_id_override: Option<String>,
    clock: Box<dyn TimeSource>,
    connected: watch::Receiver<bool>,
    network: Box<dyn FrameSink>,
    store: Box<dyn FrameStore>,
    stats: PipelineStats,
}

impl TelemetryPipeline {
    pub fn new(
        config: &LoggerConfig,
        connected: watch::Receiver<bool>,
        network: Box<dyn FrameSink>,
        store: Box<dyn FrameStore>,
        clock: Box<dyn TimeSource>,
    ) -> (Self, LineSink) {
        let (tx, rx) = mpsc::channel(config.line_queue_depth.max(1));
        let sink = LineSink::bind(tx, config.max_line_bytes);
        let pipeline = Self {
            lines: rx,
            sensor_map: config.sensor_map(),
            total_channels: config.total_channels,
            device_id: config.device_id.clone(),
            device_id_override: None,
            clock,
            connected,
            network,
            store,
            stats: PipelineStats::default(),
        };
        (pipeline, sink)
    }

    /// Temporary device-identity override (testing/commissioning); `None`
    /// restores the configured identity.
    pub fn set_device_id_override(&mut self, device_id: Option<String>) {
        self.device_id_override = device_id;
    }

    fn effective_device_id(&self) -> &str {
        self.device_id_override.as_deref().unwrap_or(&self.device_id)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Main loop: blocks on the line queue until every sink handle is gone.
    pub async fn run(&mut self) {
        info!(
            device_id = %self.effective_device_id(),
            channels = self.total_channels,
            "telemetry pipeline running"
        );
        while let Some(line) = self.lines.recv().await {
            self.process_line(&line).await;
        }
        info!("line queue closed, telemetry pipeline stopping");
    }

    /// Processes one raw line end to end. `None` means the line never made
    /// it to delivery (rejected by the parser or frame overflow).
    pub async fn process_line(&mut self, line: &[u8]) -> Option<DeliveryReport> {
        self.stats.lines_received += 1;

        let record = match parse_record(line, &self.sensor_map) {
            Ok(record) => record,
            Err(e) => {
                self.stats.lines_rejected += 1;
                warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(line).trim(),
                    "serial line rejected"
                );
                return None;
            }
        };
        debug!(
            timestamp = %record.timestamp_full,
            channels = record.channel_count(),
            "record parsed"
        );

        let timestamp = self.clock.frame_timestamp();
        let frame = match build_frame(
            &record,
            self.total_channels,
            self.effective_device_id(),
            &timestamp,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.frame_overflows += 1;
                warn!(error = %e, "frame build failed");
                return None;
            }
        };

        let report = self.deliver(&frame).await;
        info!(
            network = report.network_delivered,
            archived = report.archived,
            "frame processed"
        );
        Some(report)
    }

    async fn deliver(&mut self, frame: &FrameBuffer) -> DeliveryReport {
        let network_delivered = if *self.connected.borrow() {
            let delivered = self.network.deliver(frame.as_bytes()).await;
            if delivered {
                self.stats.network_delivered += 1;
            } else {
                self.stats.network_failed += 1;
            }
            delivered
        } else {
            self.stats.network_skipped += 1;
            debug!("network not connected, frame not sent");
            false
        };

        // The archive is attempted regardless of the network outcome.
        let stamp = self.clock.date_stamp();
        let archived = self.store.archive(&stamp, frame.as_bytes()).await;
        if archived {
            self.stats.archived += 1;
        } else {
            self.stats.archive_failed += 1;
        }

        DeliveryReport {
            network_delivered,
            archived,
        }
    }
}
