use serde::{Deserialize, Serialize};

use crate::data::segment::{RawSegment, Segment, SegmentType};
use crate::error::CurveError;

/// One full acquisition as handed over by the file decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct ForceDistanceCurve {
    pub file_id: String,
    pub curve_index: usize,
    pub segments: Vec<RawSegment>,
}

impl ForceDistanceCurve {
    pub fn new(file_id: String, curve_index: usize, segments: Vec<RawSegment>) -> Self {
        ForceDistanceCurve {
            file_id,
            curve_index,
            segments,
        }
    }

    /// Segments in acquisition order.
    pub fn sorted_segments(&self) -> Vec<&RawSegment> {
        let mut segments: Vec<&RawSegment> = self.segments.iter().collect();
        segments.sort_by_key(|s| s.segment_id);
        segments
    }

    pub fn segments_of(&self, segment_type: SegmentType) -> Vec<&RawSegment> {
        self.sorted_segments()
            .into_iter()
            .filter(|s| s.segment_type == segment_type)
            .collect()
    }
}

/// A curve after preprocessing, segments kept in acquisition order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedCurve {
    pub file_id: String,
    pub curve_index: usize,
    pub segments: Vec<Segment>,
}

impl ProcessedCurve {
    pub fn segments_of(&self, segment_type: SegmentType) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(move |s| s.segment_type == segment_type)
    }

    pub fn extend_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments_of(SegmentType::Extend)
    }

    pub fn pause_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments_of(SegmentType::Pause)
    }

    pub fn modulation_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments_of(SegmentType::Modulation)
    }

    pub fn retract_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments_of(SegmentType::Retract)
    }

    pub fn has_segment(&self, segment_type: SegmentType) -> bool {
        self.segments_of(segment_type).next().is_some()
    }

    /// The approach segment used by the contact analyses.
    pub fn first_extend(&self) -> Result<&Segment, CurveError> {
        self.extend_segments()
            .next()
            .ok_or(CurveError::MissingSegment(SegmentType::Extend))
    }

    pub fn last_retract(&self) -> Result<&Segment, CurveError> {
        self.retract_segments()
            .last()
            .ok_or(CurveError::MissingSegment(SegmentType::Retract))
    }

    /// Signed ramp distances of all but the last retract segment, cumulative
    /// from the deepest indentation outwards, in meters.
    pub fn retract_ramp_distances(&self) -> Vec<f64> {
        let retracts: Vec<&Segment> = self.retract_segments().collect();
        let mut distances = Vec::with_capacity(retracts.len().saturating_sub(1));
        let mut x0 = 0.0;
        for segment in retracts.iter().take(retracts.len().saturating_sub(1)) {
            // ramp sizes are stored in nm
            let distance = -segment.ramp_size.unwrap_or(0.0) + x0;
            distances.push(distance * 1e-9);
            x0 = distance;
        }
        distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(segment_id: u32, segment_type: SegmentType, ramp_size: Option<f64>) -> Segment {
        Segment {
            segment_id,
            segment_type,
            height: vec![0.0, 1.0],
            deflection: vec![0.0, 0.0],
            time: vec![0.0, 1.0],
            frequency: None,
            ramp_size,
            velocity: None,
        }
    }

    fn curve() -> ProcessedCurve {
        ProcessedCurve {
            file_id: "file".to_string(),
            curve_index: 0,
            segments: vec![
                segment(0, SegmentType::Extend, None),
                segment(1, SegmentType::Modulation, None),
                segment(2, SegmentType::Retract, Some(100.0)),
                segment(3, SegmentType::Retract, Some(200.0)),
                segment(4, SegmentType::Retract, Some(300.0)),
            ],
        }
    }

    #[test]
    fn test_grouped_accessors() {
        let curve = curve();
        assert_eq!(curve.first_extend().unwrap().segment_id, 0);
        assert_eq!(curve.last_retract().unwrap().segment_id, 4);
        assert_eq!(curve.modulation_segments().count(), 1);
        assert!(!curve.has_segment(SegmentType::Pause));
    }

    #[test]
    fn test_missing_retract() {
        let mut curve = curve();
        curve.segments.retain(|s| s.segment_type != SegmentType::Retract);
        assert_eq!(
            curve.last_retract().unwrap_err(),
            CurveError::MissingSegment(SegmentType::Retract)
        );
    }

    #[test]
    fn test_retract_ramp_distances_accumulate() {
        let distances = curve().retract_ramp_distances();
        assert_eq!(distances.len(), 2);
        assert!((distances[0] - (-100e-9)).abs() < 1e-18);
        assert!((distances[1] - (-300e-9)).abs() < 1e-18);
    }
}
