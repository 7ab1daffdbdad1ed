use arrayvec::ArrayString;
use chrono::{Datelike, Local, Timelike};
use core::fmt::Write;

/// `yy/mm/dd-HH:MM:SS` is 17 bytes.
pub type TimestampBuffer = ArrayString<20>;

/// Calendar components used to derive the archive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateStamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
}

/// Source of the device's current wall time.
///
/// The pipeline stamps frames and archive paths through this seam so the
/// RTC-backed clock can be swapped for a fixed one in tests.
pub trait TimeSource: Send + Sync {
    /// Frame timestamp in the collector's `yy/mm/dd-HH:MM:SS` form.
    fn frame_timestamp(&self) -> TimestampBuffer;

    fn date_stamp(&self) -> DateStamp;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn frame_timestamp(&self) -> TimestampBuffer {
        let now = Local::now();
        let mut out = TimestampBuffer::new();
        let _ = write!(
            out,
            "{:02}/{:02}/{:02}-{:02}:{:02}:{:02}",
            now.year() % 100,
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        );
        out
    }

    fn date_stamp(&self) -> DateStamp {
        let now = Local::now();
        DateStamp {
            year: now.year() as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
        }
    }
}

/// Time source pinned to one instant, for tests and bench harnesses.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub stamp: DateStamp,
    pub minute: u8,
    pub second: u8,
}

impl FixedClock {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            stamp: DateStamp {
                year,
                month,
                day,
                hour,
            },
            minute,
            second,
        }
    }
}

impl TimeSource for FixedClock {
    fn frame_timestamp(&self) -> TimestampBuffer {
        let mut out = TimestampBuffer::new();
        let _ = write!(
            out,
            "{:02}/{:02}/{:02}-{:02}:{:02}:{:02}",
            self.stamp.year % 100,
            self.stamp.month,
            self.stamp.day,
            self.stamp.hour,
            self.minute,
            self.second
        );
        out
    }

    fn date_stamp(&self) -> DateStamp {
        self.stamp
    }
}
