use crate::bus::DeviceHandle;
use crate::clock::DateStamp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Durable-storage sink for built frames. Best-effort archive: failure is
/// reported, logged, and otherwise ignored by the pipeline.
#[async_trait]
pub trait FrameStore: Send {
    async fn archive(&mut self, stamp: &DateStamp, frame: &[u8]) -> bool;
}

/// Appends each frame to `<root>/<YYYY>/<MM>/<DD>/<HH>.log` on the storage
/// card, creating the directory hierarchy on demand.
///
/// The card shares its bus with the network adapter, so every write runs
/// under a bus lease; a lease timeout skips the write rather than stalling
/// the pipeline.
pub struct HourlyArchive {
    root: PathBuf,
    handle: DeviceHandle,
    lease_timeout: Duration,
}

impl HourlyArchive {
    pub fn new(root: impl Into<PathBuf>, handle: DeviceHandle, lease_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            handle,
            lease_timeout,
        }
    }

    /// Whether the storage card's mount point is present.
    pub fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn day_dir(&self, stamp: &DateStamp) -> PathBuf {
        self.root
            .join(format!("{:04}", stamp.year))
            .join(format!("{:02}", stamp.month))
            .join(format!("{:02}", stamp.day))
    }

    fn hour_file(dir: &Path, stamp: &DateStamp) -> PathBuf {
        dir.join(format!("{:02}.log", stamp.hour))
    }
}

#[async_trait]
impl FrameStore for HourlyArchive {
    async fn archive(&mut self, stamp: &DateStamp, frame: &[u8]) -> bool {
        if !self.is_available() {
            warn!(root = %self.root.display(), "storage card absent, archive skipped");
            return false;
        }

        let lease = match self.handle.acquire(self.lease_timeout).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "bus unavailable, archive skipped");
                return false;
            }
        };

        let dir = self.day_dir(stamp);
        let path = Self::hour_file(&dir, stamp);
        let outcome = append_frame(&dir, &path, frame).await;
        lease.release();

        match outcome {
            Ok(()) => {
                debug!(path = %path.display(), bytes = frame.len(), "frame archived");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "archive write failed");
                false
            }
        }
    }
}

async fn append_frame(dir: &Path, path: &Path, frame: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(frame).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusArbiter, BusConfig, BusId};

    const STORAGE_BUS: BusId = BusId(2);
    const STORAGE_SELECT: u8 = 38;

    fn storage_handle() -> DeviceHandle {
        let arbiter = BusArbiter::new();
        arbiter
            .initialize_bus(STORAGE_BUS, BusConfig { label: "spi2" })
            .unwrap();
        arbiter.register_device(STORAGE_BUS, STORAGE_SELECT).unwrap()
    }

    fn august_noon() -> DateStamp {
        DateStamp {
            year: 2024,
            month: 8,
            day: 1,
            hour: 12,
        }
    }

    #[tokio::test]
    async fn test_archive_creates_hierarchy_and_appends() {
        let root = tempfile::tempdir().unwrap();
        let mut archive =
            HourlyArchive::new(root.path(), storage_handle(), Duration::from_millis(100));

        let stamp = august_noon();
        assert!(archive.archive(&stamp, b"$DL-1$a$\r\n").await);
        assert!(archive.archive(&stamp, b"$DL-1$b$\r\n").await);

        let path = root.path().join("2024").join("08").join("01").join("12.log");
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "$DL-1$a$\r\n$DL-1$b$\r\n");
    }

    #[tokio::test]
    async fn test_missing_mount_is_reported_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("not-mounted");
        let mut archive =
            HourlyArchive::new(missing, storage_handle(), Duration::from_millis(100));
        assert!(!archive.archive(&august_noon(), b"frame\r\n").await);
    }

    #[tokio::test]
    async fn test_busy_bus_skips_write() {
        let arbiter = BusArbiter::new();
        arbiter
            .initialize_bus(STORAGE_BUS, BusConfig { label: "spi2" })
            .unwrap();
        let storage = arbiter.register_device(STORAGE_BUS, STORAGE_SELECT).unwrap();
        let network = arbiter.register_device(STORAGE_BUS, 10).unwrap();

        let root = tempfile::tempdir().unwrap();
        let mut archive = HourlyArchive::new(root.path(), storage, Duration::from_millis(20));

        let held = network.acquire(Duration::from_millis(100)).await.unwrap();
        assert!(!archive.archive(&august_noon(), b"frame\r\n").await);
        held.release();

        assert!(archive.archive(&august_noon(), b"frame\r\n").await);
    }
}
