use fdcore::algorithm::force::to_force_indentation;
use fdcore::data::curve::ProcessedCurve;
use fdcore::error::CurveError;
use fdcore::models::rheology::{complex_modulus, complex_modulus_from_sines, ContactPoint};
use fdcore::models::sine::fit_sine;

use crate::params::{FitRange, HertzParams, RheologyParams};
use crate::piezo_table::{resolve_correction, PiezoCharTable};
use crate::results::{MicrorheoPoint, MicrorheoResult};
use crate::routines::hertz_fit::fit_segment;
use crate::routines::{oscillations, Oscillation};

/// How amplitude and phase of the oscillation are estimated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Estimator {
    /// Transfer function at the drive bin of the spectrum.
    Fft,
    /// Independent sine fits of indentation and deflection.
    Sine,
}

fn fft_point(
    osc: &Oscillation,
    spring_constant: f64,
    contact: ContactPoint,
    rheology: &RheologyParams,
    piezo_table: Option<&PiezoCharTable>,
) -> Result<MicrorheoPoint, CurveError> {
    let (correction, piezo) = resolve_correction(piezo_table, osc.frequency);
    let modulus = complex_modulus(
        &osc.signal.deflection,
        &osc.signal.height,
        spring_constant,
        osc.sampling_rate,
        osc.frequency,
        contact,
        correction,
        rheology.bcoef,
    )?;
    Ok(MicrorheoPoint {
        frequency: osc.frequency,
        g_storage: modulus.g_storage,
        g_loss: modulus.g_loss,
        gamma2: Some(modulus.gamma2),
        indentation_fit: None,
        deflection_fit: None,
        piezo,
    })
}

// The piezo lookup is reported but amplitude and phase are used as fitted.
fn sine_point(
    osc: &Oscillation,
    spring_constant: f64,
    contact: ContactPoint,
    rheology: &RheologyParams,
    piezo_table: Option<&PiezoCharTable>,
) -> Result<MicrorheoPoint, CurveError> {
    let (_, piezo) = resolve_correction(piezo_table, osc.frequency);
    let (indentation, _) =
        to_force_indentation(&osc.signal.height, &osc.signal.deflection, [0.0, 0.0], spring_constant);

    let ind_fit = fit_sine(&osc.signal.time, &indentation, osc.frequency)?.canonical();
    let defl_fit = fit_sine(&osc.signal.time, &osc.signal.deflection, osc.frequency)?.canonical();
    if ind_fit.amplitude == 0.0 {
        return Err(CurveError::InvalidData(format!(
            "indentation does not oscillate at {} Hz",
            osc.frequency
        )));
    }

    let g = complex_modulus_from_sines(
        contact,
        spring_constant,
        defl_fit.amplitude,
        ind_fit.amplitude,
        defl_fit.phase - ind_fit.phase,
        osc.frequency,
        rheology.bcoef,
    );
    Ok(MicrorheoPoint {
        frequency: osc.frequency,
        g_storage: g.re,
        g_loss: g.im,
        gamma2: None,
        indentation_fit: Some(ind_fit),
        deflection_fit: Some(defl_fit),
        piezo,
    })
}

/// Complex shear modulus per modulation frequency.
///
/// A Hertz fit on the approach refines the contact point; the deepest
/// indentation of the refined approach is the working indentation `wc`.
pub fn run(
    curve: &ProcessedCurve,
    spring_constant: f64,
    hertz: &HertzParams,
    rheology: &RheologyParams,
    piezo_table: Option<&PiezoCharTable>,
    estimator: Estimator,
) -> Result<MicrorheoResult, CurveError> {
    let approach = curve.first_extend()?;
    let (hertz_result, poc) = fit_segment(
        approach,
        spring_constant,
        hertz.poc_window,
        &hertz.settings(),
        FitRange::Full,
        false,
    )?;

    let mut reference = poc.as_reference();
    reference[0] += hertz_result.delta0;
    let (indentation, _) = to_force_indentation(&approach.height, &approach.deflection, reference, spring_constant);
    let wc = indentation.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(wc > 0.0) {
        return Err(CurveError::InvalidData(format!(
            "approach never indents the sample, maximum indentation {}",
            wc
        )));
    }

    let contact = ContactPoint {
        geometry: hertz.contact.geometry,
        tip_param: hertz.contact.tip_param,
        poisson: hertz.contact.poisson,
        wc,
    };

    let mut points = oscillations(curve, rheology)?
        .iter()
        .map(|osc| match estimator {
            Estimator::Fft => fft_point(osc, spring_constant, contact, rheology, piezo_table),
            Estimator::Sine => sine_point(osc, spring_constant, contact, rheology, piezo_table),
        })
        .collect::<Result<Vec<_>, CurveError>>()?;
    points.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

    Ok(MicrorheoResult {
        hertz: hertz_result,
        wc,
        points,
    })
}
