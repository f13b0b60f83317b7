use crate::data::curve::{ForceDistanceCurve, ProcessedCurve};
use crate::data::segment::{RawSegment, Segment, DEFLECTION_CHANNEL};
use crate::error::CurveError;

/// File extensions whose decoders report a per-segment piezo-image height offset.
pub const JPK_FILE_EXTENSIONS: [&str; 3] = [".jpk-force", ".jpk-force-map", ".jpk-qi-data"];

pub fn requires_height_shift(file_type: &str) -> bool {
    JPK_FILE_EXTENSIONS.contains(&file_type)
}

/// Calibrate a single segment: deflection volts to meters and height channel selection.
///
/// # Arguments
/// * `segment` - raw segment as decoded
/// * `deflection_sensitivity` - sensitivity in m/V
/// * `height_channel` - name of the height channel to use
/// * `shift_height` - subtract the segment's piezo-image offset from the height
pub fn calibrate_segment(
    segment: &RawSegment,
    deflection_sensitivity: f64,
    height_channel: &str,
    shift_height: bool,
) -> Result<Segment, CurveError> {
    let raw_deflection = segment.channel(DEFLECTION_CHANNEL)?;
    let raw_height = segment.channel(height_channel)?;

    if segment.is_empty() {
        return Err(CurveError::insufficient("segment samples", 1, 0));
    }
    if raw_deflection.len() != segment.len() || raw_height.len() != segment.len() {
        return Err(CurveError::InvalidData(format!(
            "segment {} channel lengths differ: height {}, deflection {}, time {}",
            segment.segment_id,
            raw_height.len(),
            raw_deflection.len(),
            segment.len()
        )));
    }

    let offset = if shift_height { segment.metadata.height_offset } else { 0.0 };

    Ok(Segment {
        segment_id: segment.segment_id,
        segment_type: segment.segment_type,
        height: raw_height.iter().map(|h| h - offset).collect(),
        deflection: raw_deflection.iter().map(|v| v * deflection_sensitivity).collect(),
        time: segment.time.clone(),
        frequency: segment.metadata.frequency,
        ramp_size: segment.metadata.ramp_size,
        velocity: segment.metadata.velocity,
    })
}

/// Bring a curve into the canonical frame used by all analyses.
///
/// Segments are ordered by acquisition id, calibrated, and the height is
/// referenced to the last sample of the last acquired segment:
/// `height' = xzero - height`.
pub fn preprocess(
    curve: &ForceDistanceCurve,
    deflection_sensitivity: f64,
    height_channel: &str,
    shift_height: bool,
) -> Result<ProcessedCurve, CurveError> {
    let mut segments = curve
        .sorted_segments()
        .into_iter()
        .map(|s| calibrate_segment(s, deflection_sensitivity, height_channel, shift_height))
        .collect::<Result<Vec<Segment>, CurveError>>()?;

    let xzero = segments
        .last()
        .and_then(|s| s.height.last().copied())
        .ok_or_else(|| CurveError::insufficient("curve segments", 1, 0))?;

    for segment in segments.iter_mut() {
        for h in segment.height.iter_mut() {
            *h = xzero - *h;
        }
    }

    Ok(ProcessedCurve {
        file_id: curve.file_id.clone(),
        curve_index: curve.curve_index,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::segment::{SegmentMetadata, SegmentType};
    use std::collections::BTreeMap;

    fn raw(segment_id: u32, segment_type: SegmentType, height: Vec<f64>, volts: Vec<f64>, offset: f64) -> RawSegment {
        let time = (0..height.len()).map(|i| i as f64 * 1e-3).collect();
        let mut channels = BTreeMap::new();
        channels.insert("measuredHeight".to_string(), height);
        channels.insert(DEFLECTION_CHANNEL.to_string(), volts);
        RawSegment::new(
            segment_id,
            segment_type,
            channels,
            time,
            SegmentMetadata {
                height_offset: offset,
                ..Default::default()
            },
        )
    }

    fn curve() -> ForceDistanceCurve {
        // stored out of acquisition order on purpose
        ForceDistanceCurve::new(
            "f".to_string(),
            0,
            vec![
                raw(1, SegmentType::Retract, vec![2.2e-6, 2.7e-6, 3.1e-6], vec![0.2, 0.1, 0.0], 1e-7),
                raw(0, SegmentType::Extend, vec![3.0e-6, 2.5e-6, 2.0e-6], vec![0.0, 0.1, 0.3], 2e-7),
            ],
        )
    }

    #[test]
    fn test_zero_reference_on_last_acquired_sample() {
        let processed = preprocess(&curve(), 50e-9, "measuredHeight", false).unwrap();
        assert_eq!(processed.segments[0].segment_type, SegmentType::Extend);
        let last = processed.segments.last().unwrap();
        assert!(last.height.last().unwrap().abs() <= 1e-12 * 3.1e-6);
        assert!((processed.segments[0].height[0] - (3.1e-6 - 3.0e-6)).abs() < 1e-15);
    }

    #[test]
    fn test_deflection_is_scaled_by_sensitivity() {
        let processed = preprocess(&curve(), 50e-9, "measuredHeight", false).unwrap();
        assert!((processed.segments[0].deflection[2] - 0.3 * 50e-9).abs() < 1e-20);
    }

    #[test]
    fn test_height_shift_is_applied_per_segment() {
        let plain = preprocess(&curve(), 50e-9, "measuredHeight", false).unwrap();
        let shifted = preprocess(&curve(), 50e-9, "measuredHeight", true).unwrap();
        // retract offset 1e-7, extend offset 2e-7: extend moves by +1e-7 relative
        let delta = shifted.segments[0].height[0] - plain.segments[0].height[0];
        assert!((delta - 1e-7).abs() < 1e-15);
        assert!(shifted.segments[1].height.last().unwrap().abs() < 1e-18);
    }

    #[test]
    fn test_missing_height_channel() {
        let err = preprocess(&curve(), 50e-9, "capacitiveSensorHeight", false).unwrap_err();
        assert!(matches!(err, CurveError::ChannelNotFound { .. }));
    }

    #[test]
    fn test_requires_height_shift() {
        assert!(requires_height_shift(".jpk-force-map"));
        assert!(!requires_height_shift(".spm"));
    }
}
