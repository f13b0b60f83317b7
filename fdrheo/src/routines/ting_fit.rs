use log::debug;

use fdcore::algorithm::force::{correct_viscous_drag, rezero, to_force_indentation, Reference};
use fdcore::algorithm::poc::estimate_poc;
use fdcore::algorithm::signal::{argmax, linear_slope};
use fdcore::data::curve::ProcessedCurve;
use fdcore::data::segment::Segment;
use fdcore::error::CurveError;
use fdcore::models::hertz::{fit_hertz, HertzResult};
use fdcore::models::ting::{fit_ting, TingData, TingResult};

use crate::params::TingParams;

/// Piezo speed of a segment in m/s: acquisition metadata first, then the
/// configured ramp speed, then the slope of height over time.
fn segment_speed(segment: &Segment, ramp_speed: f64) -> Option<f64> {
    segment
        .velocity
        .map(f64::abs)
        .filter(|v| *v > 0.0)
        .or_else(|| (ramp_speed > 0.0).then_some(ramp_speed))
        .or_else(|| linear_slope(&segment.time, &segment.height).map(f64::abs).filter(|v| *v > 0.0))
}

/// Time gap between the end of the approach and the start of the retract,
/// applied only when it exceeds two sampling intervals.
fn retract_time_offset(ext: &Segment, ret: &Segment, speed: f64) -> Result<f64, CurveError> {
    let (Some(ext_last), Some(ret_first)) = (ext.height.last(), ret.height.first()) else {
        return Err(CurveError::insufficient("ting segments", 1, 0));
    };
    let offset = (ext_last - ret_first).abs() / speed;
    let dt = ext.sampling_interval()?;
    Ok(if offset > 2.0 * dt { offset } else { 0.0 })
}

/// Fit the Ting model to the first approach and last retract of a curve,
/// seeded by a Hertz fit on the approach.
///
/// # Returns
/// * the Ting result and the seeding Hertz result
pub fn run(
    curve: &ProcessedCurve,
    spring_constant: f64,
    params: &TingParams,
) -> Result<(TingResult, HertzResult), CurveError> {
    let ext = curve.first_extend()?;
    let ret = curve.last_retract()?;

    let poc = estimate_poc(&ext.height, &ext.deflection, params.poc_window)?;
    let mut reference = poc.as_reference();
    let (ext_indentation, ext_force) =
        to_force_indentation(&ext.height, &ext.deflection, reference, spring_constant);
    let hertz = fit_hertz(&ext_indentation, &ext_force, &params.hertz_settings())?;

    reference[0] += hertz.delta0;
    let (ext_indentation, ext_force) =
        to_force_indentation(&ext.height, &ext.deflection, reference, spring_constant);
    let (ret_indentation, ret_force) =
        to_force_indentation(&ret.height, &ret.deflection, reference, spring_constant);

    let ext_speed = segment_speed(ext, params.ramp_speed)
        .ok_or_else(|| CurveError::InvalidData("approach speed is zero".to_string()))?;
    let offset = retract_time_offset(ext, ret, ext_speed)?;
    let ret_time: Vec<f64> = ret.time.iter().map(|t| t + offset).collect();

    let (ext_force, ret_force) = if params.correct_vdrag {
        correct_viscous_drag(&ext_indentation, &ext_force, &ret_indentation, &ret_force, params.poly_order)?
    } else {
        (ext_force, ret_force)
    };

    let t0 = ext.time.last().copied().unwrap_or(0.0);
    let threshold = -params.contact_offset;
    let mut indentation = Vec::new();
    let mut force = Vec::new();
    let mut time = Vec::new();
    let ext_samples = ext_indentation.iter().zip(&ext_force).zip(&ext.time).map(|((i, f), t)| (*i, *f, *t));
    let ret_samples = ret_indentation.iter().zip(&ret_force).zip(&ret_time).map(|((i, f), t)| (*i, *f, *t + t0));
    for (i, f, t) in ext_samples.chain(ret_samples) {
        if i > threshold {
            indentation.push(i);
            force.push(f);
            time.push(t);
        }
    }
    if indentation.len() < 5 {
        return Err(CurveError::insufficient("ting contact samples", 5, indentation.len()));
    }
    rezero(&mut force, Reference::First);
    rezero(&mut time, Reference::First);

    let idx_tm = argmax(&force).ok_or_else(|| CurveError::InvalidData("force has no maximum".to_string()))?;
    let tc = time[idx_tm] / 2.0;

    let velocities = if params.estimate_velocities {
        None
    } else {
        let v0t = ext_speed;
        let v0r = segment_speed(ret, params.ramp_speed)
            .ok_or_else(|| CurveError::InvalidData("retract speed is zero".to_string()))?;
        Some((v0t, v0r))
    };

    debug!(
        "ting fit on curve {} of {}: {} samples, tm at {}, retract offset {} s",
        curve.curve_index,
        curve.file_id,
        time.len(),
        idx_tm,
        offset
    );

    let data = TingData {
        time: &time,
        force: &force,
        indentation: &indentation,
        idx_tm,
    };
    let ting = fit_ting(&data, velocities, &params.ting_settings(hertz.e0, tc))?;
    Ok((ting, hertz))
}
