//! Telemetry wire frame.
//!
//! ```text
//! u32 total_length | u32 serial_len | serial (utf-8) | 19 × f32 | 8 × i32 | u32 crc32
//! ```
//!
//! All integers and floats are little-endian. `total_length` counts the body
//! (serial block + fixed payload) plus the 4-byte CRC, not itself. The CRC is
//! CRC-32/ISO-HDLC (zlib `crc32`) over the body.
//!
//! Field order is a contract with remote peers and must not change.

use crate::consts::{FRAME_FIXED_LEN, FRAME_FLOAT_COUNT, FRAME_INT_COUNT, FRAME_WORD_LEN};
use crate::telemetry::TelemetrySnapshot;
use crc::{CRC_32_ISO_HDLC, Crc};
use thiserror::Error;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Errors raised while decoding a wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer shorter than its framing requires.
    #[error("frame truncated: need {needed} bytes, got {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes supplied.
        available: usize,
    },

    /// Buffer longer than `total_length` announces.
    #[error("frame length mismatch: header says {declared} bytes, buffer holds {actual}")]
    LengthMismatch {
        /// Length from the header (+4 for the header itself).
        declared: usize,
        /// Buffer length.
        actual: usize,
    },

    /// Serial length field inconsistent with the body, or serial not utf-8.
    #[error("malformed serial block: {0}")]
    SerialLength(String),

    /// CRC over the body does not match the trailer.
    #[error("CRC mismatch: frame carries {expected:#010x}, body hashes to {actual:#010x}")]
    CrcMismatch {
        /// CRC carried in the frame.
        expected: u32,
        /// CRC recomputed from the body.
        actual: u32,
    },
}

/// Values carried by one frame, in wire order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireRecord {
    /// Device serial, length-prefixed on the wire.
    pub device_serial: String,
    // f32 block
    /// Boom length, m.
    pub boom_length: f32,
    /// Load on the hook, t.
    pub actual_load: f32,
    /// Hydraulic fluid temperature, °C.
    pub fluid_temp: f32,
    /// Generic angle channel, deg.
    pub angle: f32,
    /// Battery voltage, V.
    pub voltage: f32,
    /// Main hook height, m.
    pub main_height: f32,
    /// Engine speed, rpm.
    pub engine_rpm: f32,
    /// Auxiliary hook height, m.
    pub aux_height: f32,
    /// Wind speed, m/s.
    pub wind: f32,
    /// Main hook working radius, m.
    pub radius_main: f32,
    /// Engine temperature, °C.
    pub engine_temp: f32,
    /// Third hook height, m.
    pub third_height: f32,
    /// Swing angle, deg.
    pub turning_angle: f32,
    /// Swing speed.
    pub turning_speed: f32,
    /// Auxiliary hook working radius, m.
    pub radius_aux: f32,
    /// Oil pressure, bar.
    pub oil_pressure: f32,
    /// Boom angle, deg.
    pub boom_angle: f32,
    /// Lower-body angle, deg.
    pub lower_body_angle: f32,
    /// Distance to the nearest detected object, m; 0 when none.
    pub obj_distance: f32,
    // i32 block
    /// Body inclination about X, whole degrees.
    pub body_angle_x: i32,
    /// Body inclination about Y, whole degrees.
    pub body_angle_y: i32,
    /// Controller status word 1.
    pub status1: i32,
    /// Controller status word 2.
    pub status2: i32,
    /// Controller status word 3.
    pub status3: i32,
    /// Crane specification code.
    pub spec: i32,
    /// Overturn risk level, 0 to 3.
    pub danger_level: i32,
    /// Number of detected objects.
    pub obj_count: i32,
}

impl WireRecord {
    /// Map a store snapshot onto the wire fields.
    ///
    /// Floats narrow to f32; integer fields truncate toward zero.
    pub fn from_snapshot(snap: &TelemetrySnapshot) -> Self {
        Self {
            device_serial: snap.device_serial.clone(),
            boom_length: snap.boom_length as f32,
            actual_load: snap.load_weight as f32,
            fluid_temp: snap.hydraulic_temp as f32,
            angle: snap.angle as f32,
            voltage: snap.battery_voltage as f32,
            main_height: snap.main_height as f32,
            engine_rpm: snap.engine_rpm as f32,
            aux_height: snap.aux_height as f32,
            wind: snap.wind_speed as f32,
            radius_main: snap.radius_main as f32,
            engine_temp: snap.engine_temp as f32,
            third_height: snap.third_height as f32,
            turning_angle: snap.swing_angle as f32,
            turning_speed: snap.swing_speed as f32,
            radius_aux: snap.radius_aux as f32,
            oil_pressure: snap.oil_pressure as f32,
            boom_angle: snap.boom_angle as f32,
            lower_body_angle: snap.lower_angle as f32,
            obj_distance: snap.obj_distance() as f32,
            body_angle_x: snap.body_angle_x as i32,
            body_angle_y: snap.body_angle_y as i32,
            status1: snap.status1 as i32,
            status2: snap.status2 as i32,
            status3: snap.status3 as i32,
            spec: snap.specifications as i32,
            danger_level: snap.danger_level.as_i32(),
            obj_count: snap.obj_count(),
        }
    }

    fn floats(&self) -> [f32; FRAME_FLOAT_COUNT] {
        [
            self.boom_length,
            self.actual_load,
            self.fluid_temp,
            self.angle,
            self.voltage,
            self.main_height,
            self.engine_rpm,
            self.aux_height,
            self.wind,
            self.radius_main,
            self.engine_temp,
            self.third_height,
            self.turning_angle,
            self.turning_speed,
            self.radius_aux,
            self.oil_pressure,
            self.boom_angle,
            self.lower_body_angle,
            self.obj_distance,
        ]
    }

    fn ints(&self) -> [i32; FRAME_INT_COUNT] {
        [
            self.body_angle_x,
            self.body_angle_y,
            self.status1,
            self.status2,
            self.status3,
            self.spec,
            self.danger_level,
            self.obj_count,
        ]
    }

    fn from_parts(
        device_serial: String,
        f: [f32; FRAME_FLOAT_COUNT],
        i: [i32; FRAME_INT_COUNT],
    ) -> Self {
        Self {
            device_serial,
            boom_length: f[0],
            actual_load: f[1],
            fluid_temp: f[2],
            angle: f[3],
            voltage: f[4],
            main_height: f[5],
            engine_rpm: f[6],
            aux_height: f[7],
            wind: f[8],
            radius_main: f[9],
            engine_temp: f[10],
            third_height: f[11],
            turning_angle: f[12],
            turning_speed: f[13],
            radius_aux: f[14],
            oil_pressure: f[15],
            boom_angle: f[16],
            lower_body_angle: f[17],
            obj_distance: f[18],
            body_angle_x: i[0],
            body_angle_y: i[1],
            status1: i[2],
            status2: i[3],
            status3: i[4],
            spec: i[5],
            danger_level: i[6],
            obj_count: i[7],
        }
    }
}

/// Encode a snapshot into a frame.
pub fn encode(snapshot: &TelemetrySnapshot) -> Vec<u8> {
    encode_record(&WireRecord::from_snapshot(snapshot))
}

/// Encode a wire record into a frame.
pub fn encode_record(record: &WireRecord) -> Vec<u8> {
    let serial = record.device_serial.as_bytes();
    let body_len = FRAME_WORD_LEN + serial.len() + FRAME_FIXED_LEN;
    let total_length = (body_len + FRAME_WORD_LEN) as u32;

    let mut frame = Vec::with_capacity(body_len + 2 * FRAME_WORD_LEN);
    frame.extend_from_slice(&total_length.to_le_bytes());

    frame.extend_from_slice(&(serial.len() as u32).to_le_bytes());
    frame.extend_from_slice(serial);
    for v in record.floats() {
        frame.extend_from_slice(&v.to_le_bytes());
    }
    for v in record.ints() {
        frame.extend_from_slice(&v.to_le_bytes());
    }

    let crc = CRC32.checksum(&frame[FRAME_WORD_LEN..]);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Decode and verify a frame.
///
/// The CRC is checked before the body is interpreted, so any corruption of
/// the body is reported as [`FrameError::CrcMismatch`].
pub fn decode(frame: &[u8]) -> Result<WireRecord, FrameError> {
    let min_len = 2 * FRAME_WORD_LEN;
    if frame.len() < min_len {
        return Err(FrameError::Truncated {
            needed: min_len,
            available: frame.len(),
        });
    }

    let declared = read_u32(frame, 0) as usize + FRAME_WORD_LEN;
    if frame.len() < declared {
        return Err(FrameError::Truncated {
            needed: declared,
            available: frame.len(),
        });
    }
    if frame.len() > declared {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }

    let crc_at = frame.len() - FRAME_WORD_LEN;
    let body = &frame[FRAME_WORD_LEN..crc_at];
    let expected = read_u32(frame, crc_at);
    let actual = CRC32.checksum(body);
    if expected != actual {
        return Err(FrameError::CrcMismatch { expected, actual });
    }

    if body.len() < FRAME_WORD_LEN + FRAME_FIXED_LEN {
        return Err(FrameError::Truncated {
            needed: 2 * FRAME_WORD_LEN + FRAME_WORD_LEN + FRAME_FIXED_LEN,
            available: frame.len(),
        });
    }

    let serial_len = read_u32(body, 0) as usize;
    if FRAME_WORD_LEN + serial_len + FRAME_FIXED_LEN != body.len() {
        return Err(FrameError::SerialLength(format!(
            "serial length {serial_len} does not fit a {}-byte body",
            body.len()
        )));
    }
    let serial_end = FRAME_WORD_LEN + serial_len;
    let device_serial = std::str::from_utf8(&body[FRAME_WORD_LEN..serial_end])
        .map_err(|e| FrameError::SerialLength(e.to_string()))?
        .to_string();

    let fixed = &body[serial_end..];
    let mut floats = [0.0f32; FRAME_FLOAT_COUNT];
    for (idx, slot) in floats.iter_mut().enumerate() {
        *slot = f32::from_le_bytes(word(fixed, idx));
    }
    let mut ints = [0i32; FRAME_INT_COUNT];
    for (idx, slot) in ints.iter_mut().enumerate() {
        *slot = i32::from_le_bytes(word(fixed, FRAME_FLOAT_COUNT + idx));
    }

    Ok(WireRecord::from_parts(device_serial, floats, ints))
}

fn word(buf: &[u8], idx: usize) -> [u8; 4] {
    let at = idx * 4;
    [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLevel;
    use crate::telemetry::{DetectedObject, DetectionSummary};

    fn sample_snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            device_serial: "10000000DEADBEEF".to_string(),
            boom_length: 10.5,
            load_weight: 2.5,
            hydraulic_temp: 60.5,
            battery_voltage: 24.1,
            engine_rpm: 1200.0,
            swing_angle: 120.5,
            boom_angle: 45.0,
            body_angle_x: -1.7,
            body_angle_y: 2.9,
            specifications: 250.0,
            status1: 1.0,
            danger_level: RiskLevel::Warning,
            detections: DetectionSummary {
                count: 2,
                objects: vec![
                    DetectedObject { distance: Some(3.0), center: 0.2 },
                    DetectedObject { distance: Some(1.5), center: 0.7 },
                ],
            },
            ..Default::default()
        }
    }

    #[test]
    fn frame_layout_matches_contract() {
        let frame = encode(&sample_snapshot());
        let serial_len = 16;
        assert_eq!(frame.len(), 4 + 4 + serial_len + 108 + 4);
        assert_eq!(read_u32(&frame, 0) as usize, frame.len() - 4);
        assert_eq!(read_u32(&frame, 4) as usize, serial_len);
        assert_eq!(&frame[8..8 + serial_len], b"10000000DEADBEEF");

        // First float is boom_length.
        let fixed = &frame[8 + serial_len..];
        assert_eq!(f32::from_le_bytes(word(fixed, 0)), 10.5);
        // Int block: body_angle_x truncates toward zero, danger level at slot 6.
        assert_eq!(i32::from_le_bytes(word(fixed, 19)), -1);
        assert_eq!(i32::from_le_bytes(word(fixed, 19 + 6)), 2);
        assert_eq!(i32::from_le_bytes(word(fixed, 19 + 7)), 2);
    }

    #[test]
    fn crc_matches_zlib_crc32() {
        // zlib.crc32(b"123456789") == 0xCBF43926
        assert_eq!(CRC32.checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn decode_reproduces_every_field() {
        let snap = sample_snapshot();
        let decoded = decode(&encode(&snap)).unwrap();
        assert_eq!(decoded, WireRecord::from_snapshot(&snap));
        assert_eq!(decoded.obj_distance, 1.5);
        assert_eq!(decoded.spec, 250);
    }

    #[test]
    fn empty_serial_is_valid() {
        let decoded = decode(&encode(&TelemetrySnapshot::default())).unwrap();
        assert!(decoded.device_serial.is_empty());
    }

    #[test]
    fn any_body_byte_flip_is_a_crc_mismatch() {
        let frame = encode(&sample_snapshot());
        for idx in 4..frame.len() - 4 {
            let mut corrupt = frame.clone();
            corrupt[idx] ^= 0x01;
            assert!(
                matches!(decode(&corrupt), Err(FrameError::CrcMismatch { .. })),
                "flip at {idx} not detected"
            );
        }
    }

    #[test]
    fn truncated_and_oversized_frames_are_rejected() {
        let frame = encode(&sample_snapshot());
        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(FrameError::Truncated { .. })
        ));
        assert!(matches!(decode(&frame[..3]), Err(FrameError::Truncated { .. })));

        let mut longer = frame.clone();
        longer.push(0);
        assert!(matches!(
            decode(&longer),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn inconsistent_serial_length_is_rejected() {
        // Forge a frame whose serial length disagrees with the body, with a valid CRC.
        let mut frame = encode(&sample_snapshot());
        frame[4..8].copy_from_slice(&99u32.to_le_bytes());
        let crc_at = frame.len() - 4;
        let crc = CRC32.checksum(&frame[4..crc_at]);
        frame[crc_at..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(decode(&frame), Err(FrameError::SerialLength(_))));
    }
}
