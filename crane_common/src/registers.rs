//! Register and datagram decoding.
//!
//! Pure functions turning raw field-bus data into physical quantities:
//!
//! - [`decode_f32`] / [`encode_pair`] - two holding registers ↔ IEEE-754 f32
//! - [`decode_block`] - the 40-register main-crane block
//! - [`decode_safety`] - the 7-register stability sensor block
//! - [`decode_load_cells`] - the 25-byte load-cell datagram
//! - engineering conversions ([`overturn_stability`], [`center_x`],
//!   [`center_y`], [`load`])
//!
//! The order in which the two 16-bit words of a float are concatenated is set
//! by device firmware, so it is always passed in as a [`WordOrder`].

use crate::consts::{
    LOAD_CELL_COUNT, LOAD_CELL_DATAGRAM_LEN, MAIN_BLOCK_REGISTERS, SAFETY_BLOCK_REGISTERS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding a register block or datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer registers than the layout requires.
    #[error("insufficient register data: need {needed}, got {available}")]
    InsufficientData {
        /// Registers required.
        needed: usize,
        /// Registers supplied.
        available: usize,
    },

    /// Datagram shorter than the fixed payload.
    #[error("datagram too short: {len} bytes (expected {LOAD_CELL_DATAGRAM_LEN})")]
    DatagramTooShort {
        /// Received length.
        len: usize,
    },
}

/// Word-order policy for 32-bit values spread over two registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// `regs[i]` carries the high 16 bits.
    #[default]
    HighFirst,
    /// `regs[i]` carries the low 16 bits.
    LowFirst,
}

/// Decode one f32 from `regs[index]` and `regs[index + 1]`.
pub fn decode_f32(regs: &[u16], index: usize, order: WordOrder) -> Result<f32, DecodeError> {
    let needed = index + 2;
    if regs.len() < needed {
        return Err(DecodeError::InsufficientData {
            needed,
            available: regs.len(),
        });
    }

    let (first, second) = (regs[index] as u32, regs[index + 1] as u32);
    let bits = match order {
        WordOrder::HighFirst => (first << 16) | second,
        WordOrder::LowFirst => (second << 16) | first,
    };
    Ok(f32::from_bits(bits))
}

/// Split an f32 into the two registers [`decode_f32`] reads back.
pub fn encode_pair(value: f32, order: WordOrder) -> [u16; 2] {
    let bits = value.to_bits();
    let high = (bits >> 16) as u16;
    let low = (bits & 0xFFFF) as u16;
    match order {
        WordOrder::HighFirst => [high, low],
        WordOrder::LowFirst => [low, high],
    }
}

/// Main crane controller values, one per register pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MainCraneBlock {
    /// Boom length, m.
    pub boom_length: f32,
    /// Boom angle, deg.
    pub boom_angle: f32,
    /// Crane specification code.
    pub specifications: f32,
    /// Main hook working radius, m.
    pub radius_main: f32,
    /// Auxiliary hook working radius, m.
    pub radius_aux: f32,
    /// Load on the hook, t.
    pub load_weight: f32,
    /// Battery voltage, V.
    pub battery_voltage: f32,
    /// Engine speed, rpm.
    pub engine_rpm: f32,
    /// Engine temperature, °C.
    pub engine_temp: f32,
    /// Oil pressure, bar.
    pub oil_pressure: f32,
    /// Hydraulic fluid temperature, °C.
    pub hydraulic_temp: f32,
    /// Main hook height, m.
    pub main_height: f32,
    /// Auxiliary hook height, m.
    pub aux_height: f32,
    /// Third hook height, m.
    pub third_height: f32,
    /// Controller status word 1.
    pub status1: f32,
    /// Controller status word 2.
    pub status2: f32,
    /// Wind speed, m/s.
    pub wind_speed: f32,
    /// Lower-body angle, deg.
    pub lower_angle: f32,
    /// Swing angle, deg.
    pub swing_angle: f32,
}

/// Register offset of every main-crane value, in block order.
pub const MAIN_BLOCK_LAYOUT: [(&str, usize); 19] = [
    ("boom length(m)", 2),
    ("boom angle(deg)", 4),
    ("specifications", 6),
    ("radius main(m)", 8),
    ("radius aux(m)", 10),
    ("weight(ton)", 12),
    ("battery voltage(V)", 14),
    ("engine speed(rpm)", 16),
    ("engine temp(C)", 18),
    ("oil pressure(bar)", 20),
    ("hydraulic temp(C)", 22),
    ("main height(m)", 24),
    ("aux height(m)", 26),
    ("third height(m)", 28),
    ("status1", 30),
    ("status2", 32),
    ("wind speed(m/s)", 34),
    ("lower angle(deg)", 36),
    ("swing angle(deg)", 38),
];

impl MainCraneBlock {
    /// Values paired with their display labels, in [`MAIN_BLOCK_LAYOUT`] order.
    pub fn named_values(&self) -> [(&'static str, f32); 19] {
        let values = self.values();
        let mut out = [("", 0.0f32); 19];
        for (slot, ((name, _), value)) in out
            .iter_mut()
            .zip(MAIN_BLOCK_LAYOUT.iter().zip(values))
        {
            *slot = (*name, value);
        }
        out
    }

    /// Look up one value by its display label.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.named_values()
            .into_iter()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| value)
    }

    fn values(&self) -> [f32; 19] {
        [
            self.boom_length,
            self.boom_angle,
            self.specifications,
            self.radius_main,
            self.radius_aux,
            self.load_weight,
            self.battery_voltage,
            self.engine_rpm,
            self.engine_temp,
            self.oil_pressure,
            self.hydraulic_temp,
            self.main_height,
            self.aux_height,
            self.third_height,
            self.status1,
            self.status2,
            self.wind_speed,
            self.lower_angle,
            self.swing_angle,
        ]
    }
}

/// Decode the full main-crane block.
///
/// Fails without producing any value if fewer than 40 registers are given.
pub fn decode_block(regs: &[u16], order: WordOrder) -> Result<MainCraneBlock, DecodeError> {
    if regs.len() < MAIN_BLOCK_REGISTERS {
        return Err(DecodeError::InsufficientData {
            needed: MAIN_BLOCK_REGISTERS,
            available: regs.len(),
        });
    }

    let at = |index: usize| decode_f32(regs, index, order);
    Ok(MainCraneBlock {
        boom_length: at(2)?,
        boom_angle: at(4)?,
        specifications: at(6)?,
        radius_main: at(8)?,
        radius_aux: at(10)?,
        load_weight: at(12)?,
        battery_voltage: at(14)?,
        engine_rpm: at(16)?,
        engine_temp: at(18)?,
        oil_pressure: at(20)?,
        hydraulic_temp: at(22)?,
        main_height: at(24)?,
        aux_height: at(26)?,
        third_height: at(28)?,
        status1: at(30)?,
        status2: at(32)?,
        wind_speed: at(34)?,
        lower_angle: at(36)?,
        swing_angle: at(38)?,
    })
}

// ─── Engineering conversions ────────────────────────────────────────
//
// The formulas are kept in their deployed form (not simplified) so results
// match existing installations bit for bit.

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Anti-overturn stability percentage.
pub fn overturn_stability(raw: u16) -> f64 {
    round1(raw as f64 / 2000.0 * 200.0 - 100.0)
}

/// Centre-of-gravity X position in millimetres.
pub fn center_x(raw: u16) -> f64 {
    round1(raw as f64 / 10000.0 * 10000.0 - 5000.0)
}

/// Centre-of-gravity Y position in millimetres.
pub fn center_y(raw: u16) -> f64 {
    round1(raw as f64 / 10000.0 * 10000.0 - 5000.0)
}

/// Average outrigger load in tonnes.
pub fn load(raw: u16) -> f64 {
    round1(raw as f64 / 400.0 * 40.0)
}

/// Converted stability-sensor block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SafetyReading {
    /// Overturn stability, percent.
    pub stability: f64,
    /// Centre of gravity X, mm.
    pub center_x: f64,
    /// Centre of gravity Y, mm.
    pub center_y: f64,
    /// Front outrigger load, t.
    pub load_front: f64,
    /// Rear outrigger load, t.
    pub load_rear: f64,
    /// Right outrigger load, t.
    pub load_right: f64,
    /// Left outrigger load, t.
    pub load_left: f64,
}

/// Decode the stability sensor's 7 registers.
pub fn decode_safety(regs: &[u16]) -> Result<SafetyReading, DecodeError> {
    if regs.len() < SAFETY_BLOCK_REGISTERS {
        return Err(DecodeError::InsufficientData {
            needed: SAFETY_BLOCK_REGISTERS,
            available: regs.len(),
        });
    }

    Ok(SafetyReading {
        stability: overturn_stability(regs[0]),
        center_x: center_x(regs[1]),
        center_y: center_y(regs[2]),
        load_front: load(regs[3]),
        load_rear: load(regs[4]),
        load_right: load(regs[5]),
        load_left: load(regs[6]),
    })
}

/// Load-cell datagram contents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadCellReading {
    /// Six load cells: left 1..3 then right 1..3.
    pub cells: [f32; LOAD_CELL_COUNT],
    /// Non-zero when the sensor reports a rollover.
    pub roll_over_flag: u8,
}

/// Datagram field names in payload order.
pub const LOAD_CELL_NAMES: [&str; LOAD_CELL_COUNT] = [
    "left_lc_1",
    "left_lc_2",
    "left_lc_3",
    "right_lc_1",
    "right_lc_2",
    "right_lc_3",
];

impl LoadCellReading {
    /// Look up a value by datagram field name, including `roll_over_flag`.
    pub fn get(&self, name: &str) -> Option<f64> {
        if name == "roll_over_flag" {
            return Some(self.roll_over_flag as f64);
        }
        LOAD_CELL_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.cells[idx] as f64)
    }
}

/// Decode a `<6f B` little-endian datagram. Bytes past the 25th are ignored.
pub fn decode_load_cells(payload: &[u8]) -> Result<LoadCellReading, DecodeError> {
    if payload.len() < LOAD_CELL_DATAGRAM_LEN {
        return Err(DecodeError::DatagramTooShort { len: payload.len() });
    }

    let mut cells = [0.0f32; LOAD_CELL_COUNT];
    for (idx, chunk) in payload[..LOAD_CELL_COUNT * 4].chunks_exact(4).enumerate() {
        cells[idx] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    Ok(LoadCellReading {
        cells,
        roll_over_flag: payload[LOAD_CELL_COUNT * 4],
    })
}

/// Build a datagram (simulation and tests).
pub fn encode_load_cells(reading: &LoadCellReading) -> [u8; LOAD_CELL_DATAGRAM_LEN] {
    let mut out = [0u8; LOAD_CELL_DATAGRAM_LEN];
    for (idx, cell) in reading.cells.iter().enumerate() {
        out[idx * 4..idx * 4 + 4].copy_from_slice(&cell.to_le_bytes());
    }
    out[LOAD_CELL_COUNT * 4] = reading.roll_over_flag;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(values: &[(usize, f32)], order: WordOrder) -> Vec<u16> {
        let mut regs = vec![0u16; MAIN_BLOCK_REGISTERS];
        for &(offset, value) in values {
            let [a, b] = encode_pair(value, order);
            regs[offset] = a;
            regs[offset + 1] = b;
        }
        regs
    }

    #[test]
    fn decode_f32_word_orders_differ() {
        // 1.0f32 = 0x3F80_0000
        let regs = [0x3F80, 0x0000];
        assert_eq!(decode_f32(&regs, 0, WordOrder::HighFirst).unwrap(), 1.0);
        assert_eq!(decode_f32(&[0x0000, 0x3F80], 0, WordOrder::LowFirst).unwrap(), 1.0);
        assert_ne!(decode_f32(&regs, 0, WordOrder::LowFirst).unwrap(), 1.0);
    }

    #[test]
    fn decode_f32_rejects_short_input() {
        let err = decode_f32(&[1, 2, 3], 2, WordOrder::HighFirst).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientData {
                needed: 4,
                available: 3
            }
        );
    }

    #[test]
    fn decode_block_reads_fixed_offsets() {
        let regs = block_with(
            &[(2, 12.34), (4, -5.0), (12, 2.5), (38, 120.5)],
            WordOrder::HighFirst,
        );
        let block = decode_block(&regs, WordOrder::HighFirst).unwrap();
        assert_eq!(block.boom_length, 12.34);
        assert_eq!(block.boom_angle, -5.0);
        assert_eq!(block.load_weight, 2.5);
        assert_eq!(block.swing_angle, 120.5);
        assert_eq!(block.get("boom length(m)"), Some(12.34));
        assert_eq!(block.get("boom angle(deg)"), Some(-5.0));
        assert_eq!(block.get("wind speed(m/s)"), Some(0.0));
        assert_eq!(block.get("no such label"), None);
    }

    #[test]
    fn decode_block_never_partially_succeeds() {
        let regs = vec![0u16; MAIN_BLOCK_REGISTERS - 1];
        assert_eq!(
            decode_block(&regs, WordOrder::LowFirst),
            Err(DecodeError::InsufficientData {
                needed: 40,
                available: 39
            })
        );
    }

    #[test]
    fn named_values_follow_layout() {
        let block = MainCraneBlock::default();
        let named = block.named_values();
        for ((name, _), (label, _)) in named.iter().zip(MAIN_BLOCK_LAYOUT.iter()) {
            assert_eq!(name, label);
        }
    }

    #[test]
    fn engineering_conversions() {
        assert_eq!(overturn_stability(1500), 50.0);
        assert_eq!(overturn_stability(0), -100.0);
        assert_eq!(overturn_stability(2000), 100.0);
        assert_eq!(overturn_stability(1501), 50.1);
        assert_eq!(center_x(5000), 0.0);
        assert_eq!(center_y(7500), 2500.0);
        assert_eq!(load(400), 40.0);
        assert_eq!(load(123), 12.3);
    }

    #[test]
    fn decode_safety_block() {
        let reading = decode_safety(&[1500, 5000, 4000, 400, 200, 100, 50]).unwrap();
        assert_eq!(reading.stability, 50.0);
        assert_eq!(reading.center_x, 0.0);
        assert_eq!(reading.center_y, -1000.0);
        assert_eq!(reading.load_front, 40.0);
        assert_eq!(reading.load_left, 5.0);
        assert!(matches!(
            decode_safety(&[0; 6]),
            Err(DecodeError::InsufficientData { needed: 7, .. })
        ));
    }

    #[test]
    fn load_cell_datagram() {
        let expected = LoadCellReading {
            cells: [1.1, 1.2, 1.3, 2.1, 2.2, 2.3],
            roll_over_flag: 1,
        };
        let bytes = encode_load_cells(&expected);
        let reading = decode_load_cells(&bytes).unwrap();
        assert_eq!(reading.get("left_lc_1"), Some(1.1f32 as f64));
        assert_eq!(reading.get("right_lc_3"), Some(2.3f32 as f64));
        assert_eq!(reading.get("roll_over_flag"), Some(1.0));

        let mut longer = bytes.to_vec();
        longer.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(decode_load_cells(&longer).unwrap(), expected);

        assert_eq!(
            decode_load_cells(&bytes[..24]),
            Err(DecodeError::DatagramTooShort { len: 24 })
        );
    }
}
