use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use fdcore::data::curve::ForceDistanceCurve;
use fdcore::data::segment::{RawSegment, SegmentMetadata, SegmentType, DEFLECTION_CHANNEL};
use fdcore::error::CurveError;

use crate::data::file::{FileMetadata, ForceCurveFile};
use crate::params::DEFAULT_HEIGHT_CHANNEL;

/// Deflection response of the cantilever to the height modulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ModulationResponse {
    /// In contact: deflection is `gain` times the height, leading it by `phase` radians.
    Contact { gain: f64, phase: f64 },
    /// Away from the surface: deflection follows `drag / k` times the piezo velocity.
    Hydrodynamic { drag: f64 },
}

/// Parameters of a synthetic acquisition. Lengths in m, forces in N.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub file_name: String,
    pub file_type: String,
    pub n_curves: usize,
    pub force_volume: bool,
    pub seed: u64,
    pub spring_constant: f64,
    /// m/V
    pub deflection_sensitivity: f64,
    pub tip_radius: f64,
    pub poisson: f64,
    /// Pa, every curve draws its own modulus around this value
    pub young_modulus: f64,
    pub modulus_spread: f64,
    pub ramp_distance: f64,
    pub contact_height: f64,
    pub ramp_samples: usize,
    pub ramp_duration: f64,
    /// Piezo height at the top of the ramp, raw frame
    pub piezo_top: f64,
    pub deflection_noise: f64,
    pub modulation_frequencies: Vec<f64>,
    pub modulation_amplitude: f64,
    pub modulation_periods: usize,
    pub samples_per_period: usize,
    pub modulation_response: ModulationResponse,
    /// Curves decoded without a height channel
    pub corrupt_curves: BTreeSet<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            file_name: "synthetic.jpk-force-map".to_string(),
            file_type: ".jpk-force-map".to_string(),
            n_curves: 16,
            force_volume: true,
            seed: 42,
            spring_constant: 0.1,
            deflection_sensitivity: 50e-9,
            tip_radius: 25e-9,
            poisson: 0.5,
            young_modulus: 5e3,
            modulus_spread: 0.05,
            ramp_distance: 3e-6,
            contact_height: 1.5e-6,
            ramp_samples: 1000,
            ramp_duration: 1.0,
            piezo_top: 10e-6,
            deflection_noise: 2e-10,
            modulation_frequencies: vec![],
            modulation_amplitude: 10e-9,
            modulation_periods: 8,
            samples_per_period: 100,
            modulation_response: ModulationResponse::Contact { gain: 0.25, phase: 0.2 },
            corrupt_curves: BTreeSet::new(),
        }
    }
}

impl SimulationConfig {
    /// Single force curve file.
    pub fn single(file_name: &str) -> Self {
        SimulationConfig {
            file_name: file_name.to_string(),
            file_type: ".jpk-force".to_string(),
            n_curves: 1,
            force_volume: false,
            ..Default::default()
        }
    }

    /// Force volume with `n_curves` curves.
    pub fn map(file_name: &str, n_curves: usize) -> Self {
        SimulationConfig {
            file_name: file_name.to_string(),
            n_curves,
            ..Default::default()
        }
    }
}

/// Deflection of a cantilever pressed onto an elastic half space by a
/// paraboloidal tip at piezo position `z`, solved by bisection on
/// `k d = A (z - zc - d)^1.5`.
pub fn hertz_deflection(z: f64, contact_height: f64, stiffness: f64, spring_constant: f64) -> f64 {
    let depth = z - contact_height;
    if depth <= 0.0 {
        return 0.0;
    }
    let (mut lo, mut hi) = (0.0, depth);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        let balance = spring_constant * mid - stiffness * (depth - mid).powf(1.5);
        if balance > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Force curve file generated on demand from a [`SimulationConfig`].
pub struct SyntheticForceFile {
    config: SimulationConfig,
    metadata: FileMetadata,
}

impl SyntheticForceFile {
    pub fn new(config: SimulationConfig) -> Self {
        let metadata = FileMetadata {
            entry_filename: config.file_name.clone(),
            file_type: config.file_type.clone(),
            file_path: format!("synthetic://{}", config.file_name),
            total_curves: config.n_curves,
            height_channel_key: DEFAULT_HEIGHT_CHANNEL.to_string(),
            defl_sens_nm_by_v: Some(config.deflection_sensitivity * 1e9),
            spring_const_n_by_m: Some(config.spring_constant),
        };
        SyntheticForceFile { config, metadata }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Young's modulus drawn for `curve_index`.
    pub fn curve_modulus(&self, curve_index: usize) -> f64 {
        let mut rng = self.rng(curve_index);
        let spread = self.config.modulus_spread * self.config.young_modulus;
        match Normal::new(self.config.young_modulus, spread) {
            Ok(dist) => dist.sample(&mut rng).max(0.1 * self.config.young_modulus),
            Err(_) => self.config.young_modulus,
        }
    }

    fn rng(&self, curve_index: usize) -> StdRng {
        StdRng::seed_from_u64(self.config.seed.wrapping_mul(1_000_003).wrapping_add(curve_index as u64))
    }

    /// Converts canonical-frame samples into a raw segment.
    #[allow(clippy::too_many_arguments)]
    fn raw_segment(
        &self,
        curve_index: usize,
        segment_id: u32,
        segment_type: SegmentType,
        z: Vec<f64>,
        deflection: Vec<f64>,
        time: Vec<f64>,
        metadata: SegmentMetadata,
    ) -> RawSegment {
        let c = &self.config;
        let height_channel = if c.corrupt_curves.contains(&curve_index) {
            "capacitiveSensorHeight"
        } else {
            DEFAULT_HEIGHT_CHANNEL
        };
        let offset = metadata.height_offset;
        let mut channels = BTreeMap::new();
        channels.insert(
            height_channel.to_string(),
            z.iter().map(|z| c.piezo_top - z + offset).collect(),
        );
        channels.insert(
            DEFLECTION_CHANNEL.to_string(),
            deflection.iter().map(|d| d / c.deflection_sensitivity).collect(),
        );
        RawSegment::new(segment_id, segment_type, channels, time, metadata)
    }

    fn ramp(&self, stiffness: f64, noise: &mut dyn FnMut() -> f64, approach: bool) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let c = &self.config;
        let n = c.ramp_samples.max(2);
        let dt = c.ramp_duration / n as f64;
        let mut z = Vec::with_capacity(n);
        let mut deflection = Vec::with_capacity(n);
        let mut time = Vec::with_capacity(n);
        for i in 0..n {
            let fraction = i as f64 / (n - 1) as f64;
            let zi = if approach { fraction } else { 1.0 - fraction } * c.ramp_distance;
            z.push(zi);
            deflection.push(hertz_deflection(zi, c.contact_height, stiffness, c.spring_constant) + noise());
            time.push(i as f64 * dt);
        }
        (z, deflection, time)
    }

    fn modulation(&self, frequency: f64, stiffness: f64, noise: &mut dyn FnMut() -> f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let c = &self.config;
        let fs = frequency * c.samples_per_period as f64;
        let n = c.samples_per_period * c.modulation_periods;
        let omega = 2.0 * PI * frequency;
        let (base, gain, phase) = match c.modulation_response {
            ModulationResponse::Contact { gain, phase } => (c.ramp_distance, gain, phase),
            // hydrodynamic response is measured well above the surface
            ModulationResponse::Hydrodynamic { drag } => {
                (c.contact_height * 0.5, omega * drag / c.spring_constant, PI / 2.0)
            }
        };
        let base_deflection = hertz_deflection(base, c.contact_height, stiffness, c.spring_constant);
        let mut z = Vec::with_capacity(n);
        let mut deflection = Vec::with_capacity(n);
        let mut time = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / fs;
            z.push(base + c.modulation_amplitude * (omega * t).sin());
            deflection.push(base_deflection + gain * c.modulation_amplitude * (omega * t + phase).sin() + noise());
            time.push(t);
        }
        (z, deflection, time)
    }
}

impl ForceCurveFile for SyntheticForceFile {
    fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    fn is_force_volume(&self) -> bool {
        self.config.force_volume
    }

    fn get_curve(&self, curve_index: usize) -> Result<ForceDistanceCurve, CurveError> {
        let c = &self.config;
        if curve_index >= c.n_curves {
            return Err(CurveError::InvalidData(format!(
                "curve index {} out of range, file has {} curves",
                curve_index, c.n_curves
            )));
        }

        let modulus = self.curve_modulus(curve_index);
        let stiffness = 4.0 / 3.0 * c.tip_radius.sqrt() * modulus / (1.0 - c.poisson * c.poisson);
        let mut rng = self.rng(curve_index);
        let normal = Normal::new(0.0, c.deflection_noise).ok();
        let mut noise = move || normal.as_ref().map_or(0.0, |dist| dist.sample(&mut rng));

        let speed = c.ramp_distance / c.ramp_duration;
        let ramp_size = c.ramp_distance * 1e9;
        let mut segments = Vec::new();

        let (z, d, t) = self.ramp(stiffness, &mut noise, true);
        let extend_meta = SegmentMetadata {
            ramp_size: Some(ramp_size),
            velocity: Some(-speed),
            height_offset: 1e-8,
            ..Default::default()
        };
        segments.push(self.raw_segment(curve_index, 0, SegmentType::Extend, z, d, t, extend_meta));

        for (i, &frequency) in c.modulation_frequencies.iter().enumerate() {
            let (z, d, t) = self.modulation(frequency, stiffness, &mut noise);
            let meta = SegmentMetadata {
                frequency: Some(frequency),
                ..Default::default()
            };
            segments.push(self.raw_segment(curve_index, i as u32 + 1, SegmentType::Modulation, z, d, t, meta));
        }

        let (z, d, t) = self.ramp(stiffness, &mut noise, false);
        let retract_meta = SegmentMetadata {
            ramp_size: Some(-ramp_size),
            velocity: Some(speed),
            ..Default::default()
        };
        let retract_id = c.modulation_frequencies.len() as u32 + 1;
        segments.push(self.raw_segment(curve_index, retract_id, SegmentType::Retract, z, d, t, retract_meta));

        Ok(ForceDistanceCurve::new(c.file_name.clone(), curve_index, segments))
    }
}
