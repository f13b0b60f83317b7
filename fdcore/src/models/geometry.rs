use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tip shape used by the contact-mechanics models.
///
/// The tip parameter is the radius in meters for a paraboloid and the
/// half-opening angle in degrees for cones and pyramids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactGeometry {
    Paraboloid,
    Cone,
    Pyramid,
}

impl ContactGeometry {
    /// Exponent `n` of the indentation in `F ∝ δ^n`.
    pub fn exponent(&self) -> f64 {
        match self {
            ContactGeometry::Paraboloid => 1.5,
            ContactGeometry::Cone | ContactGeometry::Pyramid => 2.0,
        }
    }

    /// Prefactor of the Hertz force law, `F = coeff · E / (1 - ν²) · δ^n`.
    pub fn hertz_coefficient(&self, tip_param: f64) -> f64 {
        match self {
            ContactGeometry::Paraboloid => 4.0 / 3.0 * tip_param.sqrt(),
            ContactGeometry::Cone => 2.0 / PI * tip_param.to_radians().tan(),
            ContactGeometry::Pyramid => 0.7453 * tip_param.to_radians().tan(),
        }
    }

    /// Geometry prefactor used for the oscillatory complex modulus.
    pub fn oscillation_coefficient(&self, tip_param: f64) -> f64 {
        match self {
            ContactGeometry::Paraboloid => 4.0 / 3.0 * tip_param.sqrt(),
            ContactGeometry::Cone => 2.0 / PI * tip_param.to_radians().tan(),
            ContactGeometry::Pyramid => 4.0 / (3.0 * 3f64.sqrt()) * tip_param.to_radians().tan(),
        }
    }

    /// Factor converting a dynamic stiffness into a complex shear modulus
    /// at working indentation `wc`: `(1 - ν²) / (n · A · wc^(n-1))`.
    pub fn modulus_factor(&self, tip_param: f64, poisson: f64, wc: f64) -> f64 {
        let n = self.exponent();
        (1.0 - poisson * poisson) / (n * self.oscillation_coefficient(tip_param) * wc.powf(n - 1.0))
    }
}

impl fmt::Display for ContactGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContactGeometry::Paraboloid => "paraboloid",
            ContactGeometry::Cone => "cone",
            ContactGeometry::Pyramid => "pyramid",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ContactGeometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paraboloid" => Ok(ContactGeometry::Paraboloid),
            "cone" => Ok(ContactGeometry::Cone),
            "pyramid" => Ok(ContactGeometry::Pyramid),
            other => Err(format!("unknown contact model: {}", other)),
        }
    }
}
