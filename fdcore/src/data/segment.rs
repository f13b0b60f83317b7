use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CurveError;

/// Name of the raw deflection channel (volts) every decoder provides.
pub const DEFLECTION_CHANNEL: &str = "vDeflection";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegmentType {
    Extend,
    Pause,
    Modulation,
    Retract,
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentType::Extend => "extend",
            SegmentType::Pause => "pause",
            SegmentType::Modulation => "modulation",
            SegmentType::Retract => "retract",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SegmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extend" | "approach" => Ok(SegmentType::Extend),
            "pause" => Ok(SegmentType::Pause),
            "modulation" => Ok(SegmentType::Modulation),
            "retract" => Ok(SegmentType::Retract),
            other => Err(format!("unknown segment type: {}", other)),
        }
    }
}

/// Acquisition metadata attached to a segment by the file decoder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Drive frequency in Hz, modulation segments only
    pub frequency: Option<f64>,
    /// Ramp size in nm, signed
    pub ramp_size: Option<f64>,
    /// Piezo velocity in m/s, signed
    pub velocity: Option<f64>,
    /// Piezo-image height offset in m (JPK family decoders)
    pub height_offset: f64,
}

/// One segment as decoded from the instrument file, before calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSegment {
    pub segment_id: u32,
    pub segment_type: SegmentType,
    pub channels: BTreeMap<String, Vec<f64>>,
    pub time: Vec<f64>,
    pub metadata: SegmentMetadata,
}

impl RawSegment {
    pub fn new(
        segment_id: u32,
        segment_type: SegmentType,
        channels: BTreeMap<String, Vec<f64>>,
        time: Vec<f64>,
        metadata: SegmentMetadata,
    ) -> Self {
        RawSegment {
            segment_id,
            segment_type,
            channels,
            time,
            metadata,
        }
    }

    pub fn channel(&self, name: &str) -> Result<&[f64], CurveError> {
        self.channels
            .get(name)
            .map(|values| values.as_slice())
            .ok_or_else(|| CurveError::ChannelNotFound {
                channel: name.to_string(),
                available: self.channels.keys().cloned().collect(),
            })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// A calibrated segment: height and deflection in meters, time in seconds,
/// all sharing one index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: u32,
    pub segment_type: SegmentType,
    pub height: Vec<f64>,
    pub deflection: Vec<f64>,
    pub time: Vec<f64>,
    pub frequency: Option<f64>,
    pub ramp_size: Option<f64>,
    pub velocity: Option<f64>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.height.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height.is_empty()
    }

    /// Same segment read last-acquired sample first.
    pub fn reversed(&self) -> Segment {
        let mut height = self.height.clone();
        let mut deflection = self.deflection.clone();
        let mut time = self.time.clone();
        height.reverse();
        deflection.reverse();
        time.reverse();
        Segment {
            height,
            deflection,
            time,
            ..self.clone()
        }
    }

    /// Sampling interval taken from the first two time stamps.
    pub fn sampling_interval(&self) -> Result<f64, CurveError> {
        if self.time.len() < 2 {
            return Err(CurveError::insufficient("sampling interval", 2, self.time.len()));
        }
        let dt = (self.time[1] - self.time[0]).abs();
        if dt == 0.0 || !dt.is_finite() {
            return Err(CurveError::InvalidData(format!(
                "segment {} has a degenerate time axis",
                self.segment_id
            )));
        }
        Ok(dt)
    }

    pub fn sampling_rate(&self) -> Result<f64, CurveError> {
        Ok(1.0 / self.sampling_interval()?)
    }

    pub fn modulation_frequency(&self) -> Result<f64, CurveError> {
        self.frequency.ok_or_else(|| {
            CurveError::InvalidData(format!(
                "modulation segment {} carries no frequency",
                self.segment_id
            ))
        })
    }
}
