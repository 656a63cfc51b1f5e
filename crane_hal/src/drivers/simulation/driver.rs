//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `HalDriver` trait by synthesising
//! the raw data a real device would return for the worker's profile:
//!
//! | Profile         | Sample                                              |
//! |-----------------|-----------------------------------------------------|
//! | `main_crane`    | `count` registers, floats packed in the word order  |
//! | `safety_sensor` | 7 raw registers around a stable crane               |
//! | `load_cells`    | one 25-byte datagram                                |
//!
//! Values jitter around a fixed working point so downstream consumers see
//! plausible, changing data.

use crane_common::hal::config::{AcquisitionConfig, Profile};
use crane_common::hal::driver::{HalDriver, HalError, RawSample, RegisterRequest};
use crane_common::registers::{
    LoadCellReading, MAIN_BLOCK_LAYOUT, WordOrder, encode_load_cells, encode_pair,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info};

/// Working point of the simulated main crane, keyed by block label.
const MAIN_WORKING_POINT: [(&str, f32, f32); 19] = [
    // (label, centre, jitter)
    ("boom length(m)", 10.5, 0.1),
    ("boom angle(deg)", 45.0, 1.0),
    ("specifications", 250.0, 0.0),
    ("radius main(m)", 8.5, 0.0),
    ("radius aux(m)", 0.0, 0.0),
    ("weight(ton)", 2.5, 0.05),
    ("battery voltage(V)", 24.1, 0.0),
    ("engine speed(rpm)", 1200.0, 0.0),
    ("engine temp(C)", 85.0, 0.0),
    ("oil pressure(bar)", 150.0, 0.0),
    ("hydraulic temp(C)", 60.5, 0.0),
    ("main height(m)", 15.0, 0.0),
    ("aux height(m)", 0.0, 0.0),
    ("third height(m)", 0.0, 0.0),
    ("status1", 1.0, 0.0),
    ("status2", 0.0, 0.0),
    ("wind speed(m/s)", 3.2, 0.0),
    ("lower angle(deg)", 0.1, 0.0),
    ("swing angle(deg)", 120.5, 0.0),
];

/// Simulation driver implementing the HalDriver trait.
pub struct SimulationDriver {
    rng: StdRng,
    profile: Profile,
    word_order: WordOrder,
    initialized: bool,
    samples: u64,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic driver for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            profile: Profile::default(),
            word_order: WordOrder::default(),
            initialized: false,
            samples: 0,
        }
    }

    fn jitter(&mut self, centre: f32, spread: f32) -> f32 {
        if spread > 0.0 {
            centre + self.rng.gen_range(-spread..=spread)
        } else {
            centre
        }
    }

    fn main_block(&mut self, count: u16) -> Vec<u16> {
        let mut regs = vec![0u16; count as usize];
        for ((label, centre, spread), (layout_label, offset)) in
            MAIN_WORKING_POINT.iter().zip(MAIN_BLOCK_LAYOUT.iter())
        {
            debug_assert_eq!(label, layout_label);
            if offset + 2 > regs.len() {
                continue;
            }
            let value = self.jitter(*centre, *spread);
            regs[*offset..offset + 2].copy_from_slice(&encode_pair(value, self.word_order));
        }
        regs
    }

    fn safety_block(&mut self) -> Vec<u16> {
        vec![
            // 1850 -> 85 % stability
            self.rng.gen_range(1840..=1860),
            self.rng.gen_range(4980..=5020),
            self.rng.gen_range(4980..=5020),
            self.rng.gen_range(100..=150),
            self.rng.gen_range(100..=150),
            self.rng.gen_range(100..=150),
            self.rng.gen_range(100..=150),
        ]
    }

    fn load_cell_datagram(&mut self) -> Vec<u8> {
        let mut reading = LoadCellReading::default();
        for cell in reading.cells.iter_mut() {
            *cell = self.rng.gen_range(1.0f32..3.0);
        }
        encode_load_cells(&reading).to_vec()
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HalDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &AcquisitionConfig) -> Result<(), HalError> {
        self.profile = config.profile;
        self.word_order = config.word_order;
        self.samples = 0;
        self.initialized = true;
        info!(
            "{}: simulating {:?} ({:?})",
            config.name, config.profile, config.word_order
        );
        Ok(())
    }

    fn fetch(
        &mut self,
        request: &RegisterRequest,
        _timeout: Duration,
    ) -> Result<RawSample, HalError> {
        if !self.initialized {
            return Err(HalError::TransientRead("simulation not initialized".to_string()));
        }
        self.samples += 1;

        let sample = match self.profile {
            Profile::MainCrane => RawSample::Registers(self.main_block(request.count)),
            Profile::SafetySensor => RawSample::Registers(self.safety_block()),
            Profile::LoadCells => RawSample::Datagram(self.load_cell_datagram()),
        };
        Ok(sample)
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        debug!("simulation driver produced {} samples", self.samples);
        self.initialized = false;
        Ok(())
    }
}
