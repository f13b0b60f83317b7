use fdcore::data::curve::ProcessedCurve;
use fdcore::error::CurveError;
use fdcore::models::rheology::piezo_lag;

use crate::params::RheologyParams;
use crate::results::PiezoCharPoint;
use crate::routines::oscillations;

/// Piezo phase lag and amplitude quotient for every modulation segment,
/// sorted by frequency.
pub fn run(curve: &ProcessedCurve, rheology: &RheologyParams) -> Result<Vec<PiezoCharPoint>, CurveError> {
    let mut points = oscillations(curve, rheology)?
        .into_iter()
        .map(|osc| {
            let lag = piezo_lag(&osc.signal.height, &osc.signal.deflection, osc.sampling_rate, osc.frequency)?;
            Ok(PiezoCharPoint {
                frequency: osc.frequency,
                fi_degrees: lag.fi_degrees,
                amp_quotient: lag.amp_quotient,
                gamma2: lag.gamma2,
            })
        })
        .collect::<Result<Vec<_>, CurveError>>()?;
    points.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    Ok(points)
}
