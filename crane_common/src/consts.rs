//! System-wide constants for the crane gateway.
//!
//! Single source of truth for register layout, wire-frame sizes, and
//! default timings. Imported by all crates.

use static_assertions::const_assert_eq;

/// Default `[shared].service_name`.
pub const DEFAULT_SERVICE_NAME: &str = "crane-gateway";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/crane/gateway.toml";

// ─── Main crane register block ──────────────────────────────────────

/// Minimum register count of a main-crane block (offsets 0..=39).
pub const MAIN_BLOCK_REGISTERS: usize = 40;

/// Register count read from the stability sensor.
pub const SAFETY_BLOCK_REGISTERS: usize = 7;

/// Size of the passive register bank exposed by the RTU server driver.
pub const REGISTER_BANK_SIZE: usize = 100;

/// Largest register count one Modbus read (0x03) may request.
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

// ─── Load-cell datagram ─────────────────────────────────────────────

/// Number of load-cell channels in a datagram.
pub const LOAD_CELL_COUNT: usize = 6;

/// Datagram size: 6 × f32 + 1 × u8.
pub const LOAD_CELL_DATAGRAM_LEN: usize = LOAD_CELL_COUNT * 4 + 1;

const_assert_eq!(LOAD_CELL_DATAGRAM_LEN, 25);

// ─── Wire frame ─────────────────────────────────────────────────────

/// Number of f32 values in the fixed payload.
pub const FRAME_FLOAT_COUNT: usize = 19;

/// Number of i32 values in the fixed payload.
pub const FRAME_INT_COUNT: usize = 8;

/// Fixed payload size in bytes.
pub const FRAME_FIXED_LEN: usize = FRAME_FLOAT_COUNT * 4 + FRAME_INT_COUNT * 4;

/// Size of each u32 framing field (length prefix, serial length, CRC).
pub const FRAME_WORD_LEN: usize = 4;

const_assert_eq!(FRAME_FIXED_LEN, 108);

/// Default publish topic.
pub const DEFAULT_PUBLISH_TOPIC: &str = "Event/CraneTest/";

// ─── Serial line defaults ───────────────────────────────────────────

/// Default baud rate of every observed field-bus deployment.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default data bits.
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Default stop bits.
pub const DEFAULT_STOP_BITS: u8 = 1;

// ─── Scheduling ─────────────────────────────────────────────────────

/// Idle-wait increment; bounds how long a pending stop goes unobserved.
pub const IDLE_TICK_MS: u64 = 100;

/// Upper bound for any configured worker period.
pub const MAX_PERIOD_MS: u64 = 60_000;

/// Default acquisition period.
pub const DEFAULT_ACQUISITION_PERIOD_MS: u64 = 1_000;

/// Default publisher period.
pub const DEFAULT_PUBLISH_PERIOD_MS: u64 = 500;

/// Default bounded wait for one transport read.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;

/// Default worker join timeout at shutdown.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 2_000;

/// Capacity of the worker fault channel.
pub const FAULT_CHANNEL_CAPACITY: usize = 16;

/// Capacity of the inbound message channel.
pub const INBOUND_CHANNEL_CAPACITY: usize = 64;
