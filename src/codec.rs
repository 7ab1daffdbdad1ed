use arrayvec::ArrayString;
use core::fmt::Write;
use heapless::Vec;
use static_assertions::const_assert;
use thiserror::Error;
use tracing::debug;

pub const MAX_CHANNELS: usize = 10;
pub const MAX_LABEL_BYTES: usize = 32;
pub const MAX_UNIT_BYTES: usize = 8;
pub const MAX_FRAME_BYTES: usize = 512;

const RAW_TIMESTAMP_DIGITS: usize = 12;
const CHANNEL_SEGMENT_BYTES: usize = 4;
const PAYLOAD_CLOSE_DELIMITER: u8 = b'&';
// Readings outside this window are measurement garbage, not data.
const PLAUSIBILITY_LIMIT: f32 = 1e6;

// Frame capacity must cover the header plus every channel at full width.
const_assert!(MAX_FRAME_BYTES > 96 + MAX_CHANNELS * 16);

pub type FrameBuffer = ArrayString<MAX_FRAME_BYTES>;
pub type LabelBuffer = ArrayString<MAX_LABEL_BYTES>;
pub type UnitBuffer = ArrayString<MAX_UNIT_BYTES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line does not start with a recognized record prefix")]
    UnknownPrefix,
    #[error("no 12-digit timestamp token in line")]
    MissingTimestamp,
    #[error("payload delimiters absent")]
    MissingPayload,
    #[error("payload shorter than one channel segment")]
    PayloadTooShort,
    #[error("no channel decoded to a plausible value")]
    NoValidChannels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame buffer overflow")]
    Overflow,
}

/// Per-channel label/unit metadata resolved at parse time.
#[derive(Debug, Clone)]
pub struct SensorInfo {
    pub name: LabelBuffer,
    pub unit: UnitBuffer,
}

/// Ordered map of channel index to label/unit, loaded from configuration.
///
/// Channels beyond the map fall back to `"Unknown"` with an empty unit.
#[derive(Debug, Clone, Default)]
pub struct SensorMap {
    entries: Vec<SensorInfo, MAX_CHANNELS>,
}

impl SensorMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Appends one channel entry; extra entries beyond capacity are ignored,
    /// and over-long names/units are truncated to their buffer width.
    pub fn add(&mut self, name: &str, unit: &str) {
        if self.entries.is_full() {
            return;
        }
        let mut info = SensorInfo {
            name: LabelBuffer::new(),
            unit: UnitBuffer::new(),
        };
        for c in name.chars() {
            if info.name.try_push(c).is_err() {
                break;
            }
        }
        for c in unit.chars() {
            if info.unit.try_push(c).is_err() {
                break;
            }
        }
        let _ = self.entries.push(info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, index: usize) -> SensorInfo {
        self.entries.get(index).cloned().unwrap_or_else(|| {
            let mut name = LabelBuffer::new();
            let _ = name.try_push_str("Unknown");
            SensorInfo {
                name,
                unit: UnitBuffer::new(),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReading {
    pub value: f32,
    pub label: LabelBuffer,
    pub unit: UnitBuffer,
}

/// One structured telemetry record decoded from a raw serial line.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    /// Compact 12-digit device timestamp, `YYMMDDHHMMSS`.
    pub timestamp_raw: ArrayString<RAW_TIMESTAMP_DIGITS>,
    /// Expanded form, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp_full: ArrayString<19>,
    pub channels: Vec<ChannelReading, MAX_CHANNELS>,
}

impl SensorRecord {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Decodes one big-endian IEEE-754 f32 channel segment.
#[inline]
pub fn decode_be_f32(bytes: [u8; 4]) -> f32 {
    f32::from_be_bytes(bytes)
}

fn plausible(value: f32) -> bool {
    value.is_finite() && value > -PLAUSIBILITY_LIMIT && value < PLAUSIBILITY_LIMIT
}

/// Expands a validated `YYMMDDHHMMSS` token to `20YY-MM-DD HH:MM:SS`.
fn expand_timestamp(token: &[u8]) -> ArrayString<19> {
    debug_assert_eq!(token.len(), RAW_TIMESTAMP_DIGITS);
    let mut out = ArrayString::new();
    let d = |i: usize| token[i] as char;
    let _ = write!(
        out,
        "20{}{}-{}{}-{}{} {}{}:{}{}:{}{}",
        d(0),
        d(1),
        d(2),
        d(3),
        d(4),
        d(5),
        d(6),
        d(7),
        d(8),
        d(9),
        d(10),
        d(11)
    );
    out
}

/// Locates the first run of 12 consecutive ASCII digits at or after `start`.
fn find_timestamp_token(line: &[u8], start: usize) -> Option<usize> {
    if line.len() < start + RAW_TIMESTAMP_DIGITS {
        return None;
    }
    let mut run = 0usize;
    for (i, b) in line.iter().enumerate().skip(start) {
        if b.is_ascii_digit() {
            run += 1;
            if run == RAW_TIMESTAMP_DIGITS {
                return Some(i + 1 - RAW_TIMESTAMP_DIGITS);
            }
        } else {
            run = 0;
        }
    }
    None
}

/// Parses one raw serial line into a [`SensorRecord`].
///
/// Recognized lines start with `$R0` or `$A0`, carry a 12-digit timestamp
/// token, and hold a binary payload between the space that follows the
/// timestamp and the closing `&`. The payload is a run of 4-byte big-endian
/// floats; non-finite or implausible values are filtered out, and decoding
/// stops at channel capacity.
pub fn parse_record(line: &[u8], map: &SensorMap) -> Result<SensorRecord, ParseError> {
    if !(line.starts_with(b"$R0") || line.starts_with(b"$A0")) {
        return Err(ParseError::UnknownPrefix);
    }

    let ts_start = find_timestamp_token(line, 3).ok_or(ParseError::MissingTimestamp)?;
    let token = &line[ts_start..ts_start + RAW_TIMESTAMP_DIGITS];

    let mut timestamp_raw = ArrayString::<RAW_TIMESTAMP_DIGITS>::new();
    for &b in token {
        let _ = timestamp_raw.try_push(b as char);
    }
    let timestamp_full = expand_timestamp(token);

    // Payload sits between the opening space after the timestamp and the
    // closing '&'.
    let after_ts = ts_start + RAW_TIMESTAMP_DIGITS;
    let space_rel = line[after_ts..]
        .iter()
        .position(|&b| b == b' ')
        .ok_or(ParseError::MissingPayload)?;
    let payload_start = after_ts + space_rel + 1;
    let close_rel = line[payload_start..]
        .iter()
        .position(|&b| b == PAYLOAD_CLOSE_DELIMITER)
        .ok_or(ParseError::MissingPayload)?;
    let payload = &line[payload_start..payload_start + close_rel];

    if payload.len() < CHANNEL_SEGMENT_BYTES {
        return Err(ParseError::PayloadTooShort);
    }

    let mut channels: Vec<ChannelReading, MAX_CHANNELS> = Vec::new();
    for segment in payload.chunks_exact(CHANNEL_SEGMENT_BYTES) {
        if channels.is_full() {
            break;
        }
        let value = decode_be_f32([segment[0], segment[1], segment[2], segment[3]]);
        if !plausible(value) {
            debug!(value, "channel value rejected by plausibility filter");
            continue;
        }
        let info = map.resolve(channels.len());
        let _ = channels.push(ChannelReading {
            value,
            label: info.name,
            unit: info.unit,
        });
    }

    if channels.is_empty() {
        return Err(ParseError::NoValidChannels);
    }

    Ok(SensorRecord {
        timestamp_raw,
        timestamp_full,
        channels,
    })
}

/// Builds the wire frame for one record:
/// `$<device_id>$<timestamp>$<channel_count>$<v1>$...$<vN>$\r\n`.
///
/// Channels the record does not hold are zero-filled; channels it holds
/// beyond `channel_count` are dropped. Any append that would exceed the
/// frame buffer fails with [`FrameError::Overflow`] rather than truncating.
pub fn build_frame(
    record: &SensorRecord,
    channel_count: usize,
    device_id: &str,
    timestamp: &str,
) -> Result<FrameBuffer, FrameError> {
    let mut frame = FrameBuffer::new();

    write!(frame, "${}${}${}$", device_id, timestamp, channel_count)
        .map_err(|_| FrameError::Overflow)?;

    for index in 0..channel_count {
        let value = record.channels.get(index).map_or(0.0, |c| c.value);
        write!(frame, "{:.2}$", value).map_err(|_| FrameError::Overflow)?;
    }

    frame.try_push_str("\r\n").map_err(|_| FrameError::Overflow)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_with_payload(values: &[f32]) -> std::vec::Vec<u8> {
        let mut line = b"$R0 240801120831 ".to_vec();
        for v in values {
            line.extend_from_slice(&v.to_be_bytes());
        }
        line.push(b'&');
        line
    }

    #[test]
    fn test_decode_be_f32() {
        assert_eq!(decode_be_f32(1.5f32.to_be_bytes()), 1.5);
        assert_eq!(decode_be_f32([0, 0, 0, 0]), 0.0);
        assert!(decode_be_f32(f32::NAN.to_be_bytes()).is_nan());
    }

    #[test]
    fn test_timestamp_expansion() {
        let line = line_with_payload(&[21.5]);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        assert_eq!(record.timestamp_raw.as_str(), "240801120831");
        assert_eq!(record.timestamp_full.as_str(), "2024-08-01 12:08:31");
    }

    #[test]
    fn test_parse_accepts_both_prefixes() {
        let mut line = line_with_payload(&[1.0]);
        assert!(parse_record(&line, &SensorMap::new()).is_ok());
        line[1] = b'A';
        assert!(parse_record(&line, &SensorMap::new()).is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        let map = SensorMap::new();
        assert_eq!(
            parse_record(b"$X9 240801120831 ....&", &map),
            Err(ParseError::UnknownPrefix)
        );
        assert_eq!(
            parse_record(b"$R0 no-digits-here ....&", &map),
            Err(ParseError::MissingTimestamp)
        );
        assert_eq!(
            parse_record(b"$R0 240801120831....&", &map),
            Err(ParseError::MissingPayload)
        );
        assert_eq!(
            parse_record(b"$R0 240801120831 ....", &map),
            Err(ParseError::MissingPayload)
        );
        assert_eq!(
            parse_record(b"$R0 240801120831 ab&", &map),
            Err(ParseError::PayloadTooShort)
        );
    }

    #[test]
    fn test_plausibility_filter() {
        let line = line_with_payload(&[21.5, f32::NAN, 2e6, -2e6, 3.25]);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        assert_eq!(record.channel_count(), 2);
        assert_eq!(record.channels[0].value, 21.5);
        assert_eq!(record.channels[1].value, 3.25);
    }

    #[test]
    fn test_all_channels_implausible_is_rejected() {
        let line = line_with_payload(&[f32::NAN, f32::INFINITY, 1e7]);
        assert_eq!(
            parse_record(&line, &SensorMap::new()),
            Err(ParseError::NoValidChannels)
        );
    }

    #[test]
    fn test_channel_capacity_is_respected() {
        let values: std::vec::Vec<f32> = (0..20).map(|i| i as f32).collect();
        let line = line_with_payload(&values);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        assert_eq!(record.channel_count(), MAX_CHANNELS);
    }

    #[test]
    fn test_sensor_map_resolution() {
        let mut map = SensorMap::new();
        map.add("Temperature", "C");
        map.add("Humidity", "%");
        let line = line_with_payload(&[21.5, 63.0, 4.5]);
        let record = parse_record(&line, &map).unwrap();
        assert_eq!(record.channels[0].label.as_str(), "Temperature");
        assert_eq!(record.channels[1].unit.as_str(), "%");
        assert_eq!(record.channels[2].label.as_str(), "Unknown");
        assert_eq!(record.channels[2].unit.as_str(), "");

        map.reset();
        assert!(map.is_empty());
        let record = parse_record(&line, &map).unwrap();
        assert_eq!(record.channels[0].label.as_str(), "Unknown");
    }

    #[test]
    fn test_build_frame_grammar() {
        let line = line_with_payload(&[21.5, 63.0, 4.25]);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        let frame = build_frame(&record, 3, "DL-0042", "24/08/01-12:08:31").unwrap();
        assert_eq!(
            frame.as_str(),
            "$DL-0042$24/08/01-12:08:31$3$21.50$63.00$4.25$\r\n"
        );
    }

    #[test]
    fn test_build_frame_zero_fills_missing_channels() {
        let line = line_with_payload(&[1.0, 2.0, 3.0]);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        let frame = build_frame(&record, 5, "DL-1", "24/08/01-12:08:31").unwrap();
        assert_eq!(
            frame.as_str(),
            "$DL-1$24/08/01-12:08:31$5$1.00$2.00$3.00$0.00$0.00$\r\n"
        );
    }

    #[test]
    fn test_build_frame_drops_extra_channels() {
        let line = line_with_payload(&[1.0, 2.0, 3.0, 4.0]);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        let frame = build_frame(&record, 2, "DL-1", "24/08/01-12:08:31").unwrap();
        assert_eq!(frame.as_str(), "$DL-1$24/08/01-12:08:31$2$1.00$2.00$\r\n");
    }

    #[test]
    fn test_build_frame_overflow_is_reported() {
        let line = line_with_payload(&[1.0]);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        let oversized_id = "X".repeat(MAX_FRAME_BYTES);
        assert_eq!(
            build_frame(&record, 1, &oversized_id, "24/08/01-12:08:31"),
            Err(FrameError::Overflow)
        );
    }

    #[test]
    fn test_round_trip_preserves_two_decimal_precision() {
        let values = [12.34, 0.01, 999.99, -45.67, 100000.5];
        let line = line_with_payload(&values);
        let record = parse_record(&line, &SensorMap::new()).unwrap();
        assert_eq!(record.channel_count(), values.len());
        let frame = build_frame(&record, values.len(), "DL-7", "24/08/01-12:08:31").unwrap();
        let body: std::vec::Vec<&str> = frame.trim_end().trim_matches('$').split('$').collect();
        // body = [id, ts, count, v1..vN]
        for (i, expected) in values.iter().enumerate() {
            let got: f32 = body[3 + i].parse().unwrap();
            assert!((got - expected).abs() < 0.005);
        }
    }
}
