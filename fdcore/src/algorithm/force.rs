use itertools::izip;

use crate::algorithm::signal::{polyfit, polyval};
use crate::error::CurveError;

/// Which sample carries the zero-force baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reference {
    First,
    Last,
}

/// Convert deflection and height into indentation and force, referenced to
/// the contact point `poc = [height, deflection]`.
///
/// `force = (deflection - poc_deflection) * k`
/// `indentation = (height - poc_height) - (deflection - poc_deflection)`
///
/// Heights are expected in the zero-referenced frame, where they grow as the
/// piezo moves toward the sample.
pub fn to_force_indentation(
    height: &[f64],
    deflection: &[f64],
    poc: [f64; 2],
    spring_constant: f64,
) -> (Vec<f64>, Vec<f64>) {
    let [poc_height, poc_deflection] = poc;
    let mut indentation = Vec::with_capacity(height.len());
    let mut force = Vec::with_capacity(height.len());

    for (&h, &d) in izip!(height, deflection) {
        let centered_deflection = d - poc_deflection;
        force.push(centered_deflection * spring_constant);
        indentation.push((h - poc_height) - centered_deflection);
    }

    (indentation, force)
}

/// Shift a force trace so the reference sample sits at zero.
pub fn rezero(force: &mut [f64], reference: Reference) {
    let baseline = match reference {
        Reference::First => force.first().copied(),
        Reference::Last => force.last().copied(),
    };
    if let Some(baseline) = baseline {
        for f in force.iter_mut() {
            *f -= baseline;
        }
    }
}

/// Remove the viscous drag offset between approach and retract.
///
/// Polynomials of `poly_order` are fitted to the non-contact part
/// (`indentation < 0`) of both branches; half their gap at the contact point
/// is the drag force, subtracted from the approach and added to the retract.
pub fn correct_viscous_drag(
    ext_indentation: &[f64],
    ext_force: &[f64],
    ret_indentation: &[f64],
    ret_force: &[f64],
    poly_order: usize,
) -> Result<(Vec<f64>, Vec<f64>), CurveError> {
    let baseline = |indentation: &[f64], force: &[f64]| -> Result<f64, CurveError> {
        let (x, y): (Vec<f64>, Vec<f64>) = izip!(indentation, force)
            .filter(|(i, _)| **i < 0.0)
            .map(|(i, f)| (*i, *f))
            .unzip();
        Ok(polyval(&polyfit(&x, &y, poly_order)?, 0.0))
    };
    let drag = (baseline(ext_indentation, ext_force)? - baseline(ret_indentation, ret_force)?) / 2.0;

    Ok((
        ext_force.iter().map(|f| f - drag).collect(),
        ret_force.iter().map(|f| f + drag).collect(),
    ))
}
