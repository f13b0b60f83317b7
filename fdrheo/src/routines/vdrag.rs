use fdcore::data::curve::ProcessedCurve;
use fdcore::error::CurveError;
use fdcore::models::rheology::drag_coefficient;

use crate::params::RheologyParams;
use crate::piezo_table::{resolve_correction, PiezoCharTable};
use crate::results::{VDragPoint, VDragResult};
use crate::routines::oscillations;

/// Hydrodynamic drag coefficient per modulation frequency, corrected for the
/// piezo response when a reference table is available.
pub fn run(
    curve: &ProcessedCurve,
    spring_constant: f64,
    rheology: &RheologyParams,
    piezo_table: Option<&PiezoCharTable>,
) -> Result<VDragResult, CurveError> {
    let mut points = Vec::new();
    for osc in oscillations(curve, rheology)? {
        let (correction, piezo) = resolve_correction(piezo_table, osc.frequency);
        let drag = drag_coefficient(
            &osc.signal.deflection,
            &osc.signal.height,
            spring_constant,
            osc.sampling_rate,
            osc.frequency,
            correction,
        )?;
        points.push(VDragPoint {
            frequency: osc.frequency,
            bh: drag.bh,
            hd_real: drag.hd.re,
            hd_imag: drag.hd.im,
            gamma2: drag.gamma2,
            piezo,
        });
    }
    points.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

    Ok(VDragResult {
        points,
        distances: curve.retract_ramp_distances(),
    })
}
