//! Thread-safe telemetry store.
//!
//! Every field sits behind its own lock. A write is atomic for that field and
//! a read always returns a fully written value, but nothing orders reads or
//! writes across fields: producers run at independent cadences and a reader
//! of several fields may see values written at different times.
//!
//! The store is constructed once at startup and shared as
//! `Arc<TelemetryStore>` with every worker. [`TelemetrySnapshot`] is
//! generated from the same field list.

use crate::registers::{LoadCellReading, MainCraneBlock, SafetyReading};
use crate::risk::RiskLevel;
use crate::telemetry::snapshot::DetectionSummary;
use parking_lot::Mutex;

/// A single independently locked value.
#[derive(Debug, Default)]
pub struct Field<T> {
    value: Mutex<T>,
}

impl<T: Clone> Field<T> {
    /// Create a field holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Latest written value.
    #[inline]
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Replace the value.
    #[inline]
    pub fn set(&self, value: T) {
        *self.value.lock() = value;
    }
}

macro_rules! telemetry_store {
    ($( $(#[$doc:meta])* $name:ident, $setter:ident : $ty:ty; )*) => {
        /// Copy of every telemetry field, read field by field.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct TelemetrySnapshot {
            $( $(#[$doc])* pub $name: $ty, )*
        }

        /// Latest value of every telemetry field.
        ///
        /// All fields start at zero / empty.
        #[derive(Debug, Default)]
        pub struct TelemetryStore {
            $( $name: Field<$ty>, )*
        }

        impl TelemetryStore {
            $(
                $(#[$doc])*
                pub fn $name(&self) -> $ty {
                    self.$name.get()
                }

                #[doc = concat!("Set `", stringify!($name), "`.")]
                pub fn $setter(&self, value: $ty) {
                    self.$name.set(value);
                }
            )*

            /// Read every field once.
            ///
            /// Each field is read under its own lock; the result is not a
            /// single-instant view of the machine.
            pub fn snapshot(&self) -> TelemetrySnapshot {
                TelemetrySnapshot {
                    $( $name: self.$name.get(), )*
                }
            }
        }
    };
}

telemetry_store! {
    /// Boom length, m.
    boom_length, set_boom_length: f64;
    /// Boom angle, deg.
    boom_angle, set_boom_angle: f64;
    /// Actual hook load, t.
    load_weight, set_load_weight: f64;
    /// Engine speed, rpm.
    engine_rpm, set_engine_rpm: f64;
    /// Wind speed, m/s.
    wind_speed, set_wind_speed: f64;
    /// Swing (slewing) angle, deg.
    swing_angle, set_swing_angle: f64;
    /// Swing speed, deg/s. No built-in producer.
    swing_speed, set_swing_speed: f64;
    /// Crane specification code.
    specifications, set_specifications: f64;
    /// Main hook radius, m.
    radius_main, set_radius_main: f64;
    /// Auxiliary hook radius, m.
    radius_aux, set_radius_aux: f64;
    /// Battery voltage, V.
    battery_voltage, set_battery_voltage: f64;
    /// Engine temperature, °C.
    engine_temp, set_engine_temp: f64;
    /// Engine oil pressure.
    oil_pressure, set_oil_pressure: f64;
    /// Hydraulic fluid temperature, °C.
    hydraulic_temp, set_hydraulic_temp: f64;
    /// Main hook height, m.
    main_height, set_main_height: f64;
    /// Auxiliary hook height, m.
    aux_height, set_aux_height: f64;
    /// Third hook height, m.
    third_height, set_third_height: f64;
    /// Controller status word 1.
    status1, set_status1: f64;
    /// Controller status word 2.
    status2, set_status2: f64;
    /// Spare status word. No built-in producer.
    status3, set_status3: f64;
    /// Lower-body angle, deg.
    lower_angle, set_lower_angle: f64;
    /// Generic angle channel. No built-in producer.
    angle, set_angle: f64;
    /// Body inclination X.
    body_angle_x, set_body_angle_x: f64;
    /// Body inclination Y.
    body_angle_y, set_body_angle_y: f64;
    /// Overturn stability, percent.
    stability, set_stability: f64;
    /// Centre of gravity X, mm.
    center_x, set_center_x: f64;
    /// Centre of gravity Y, mm.
    center_y, set_center_y: f64;
    /// Outrigger loads front, rear, right, left, t.
    outrigger_loads, set_outrigger_loads: [f64; 4];
    /// Load cells left 1..3, right 1..3.
    load_cells, set_load_cells: [f32; 6];
    /// Rollover flag from the load-cell sensor.
    roll_over_flag, set_roll_over_flag: u8;
    /// Overturn risk level.
    danger_level, set_danger_level: RiskLevel;
    /// Device serial number.
    device_serial, set_device_serial: String;
    /// Latest object-detection summary.
    detections, set_detections: DetectionSummary;
}

impl TelemetryStore {
    /// Create a zero-initialised store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a decoded main-crane block, one field at a time.
    pub fn apply_main_block(&self, block: &MainCraneBlock) {
        self.set_boom_length(block.boom_length as f64);
        self.set_boom_angle(block.boom_angle as f64);
        self.set_specifications(block.specifications as f64);
        self.set_radius_main(block.radius_main as f64);
        self.set_radius_aux(block.radius_aux as f64);
        self.set_load_weight(block.load_weight as f64);
        self.set_battery_voltage(block.battery_voltage as f64);
        self.set_engine_rpm(block.engine_rpm as f64);
        self.set_engine_temp(block.engine_temp as f64);
        self.set_oil_pressure(block.oil_pressure as f64);
        self.set_hydraulic_temp(block.hydraulic_temp as f64);
        self.set_main_height(block.main_height as f64);
        self.set_aux_height(block.aux_height as f64);
        self.set_third_height(block.third_height as f64);
        self.set_status1(block.status1 as f64);
        self.set_status2(block.status2 as f64);
        self.set_wind_speed(block.wind_speed as f64);
        self.set_lower_angle(block.lower_angle as f64);
        self.set_swing_angle(block.swing_angle as f64);
    }

    /// Write a stability-sensor reading and its risk level.
    pub fn apply_safety(&self, reading: &SafetyReading, level: RiskLevel) {
        self.set_stability(reading.stability);
        self.set_center_x(reading.center_x);
        self.set_center_y(reading.center_y);
        self.set_outrigger_loads([
            reading.load_front,
            reading.load_rear,
            reading.load_right,
            reading.load_left,
        ]);
        self.set_danger_level(level);
    }

    /// Write a load-cell datagram.
    pub fn apply_load_cells(&self, reading: &LoadCellReading) {
        self.set_load_cells(reading.cells);
        self.set_roll_over_flag(reading.roll_over_flag);
    }
}
