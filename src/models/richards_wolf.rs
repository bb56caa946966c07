use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    diffraction_plane, Accuracy, ModelError, ModelFamily, PlaneContext, PlaneModel,
    RadialIntensity,
};
use crate::{
    bessel,
    config::{Geometry, Optics},
    quadrature::{Quadrature, QuadratureError},
    validation::{self, ValidationError},
};

const STABLE_REFINEMENTS: [usize; 4] = [3, 5, 7, 9];
/// Weights of the `I0`, `I1` and `I2` integrals
pub(crate) const VECTORIAL_WEIGHTS: [f64; 3] = [1., 2., 1.];

/// Richards & Wolf vectorial model
///
/// The intensity is `|I0|² + 2|I1|² + |I2|²` where the integrals run over the
/// aperture angle `θ` in the immersion medium, up to `asin(NA/ni)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichardsWolf {
    /// Immersion refractive index
    pub ni: f64,
    pub accuracy: Accuracy,
}
impl Default for RichardsWolf {
    fn default() -> Self {
        Self {
            ni: 1.5,
            accuracy: Default::default(),
        }
    }
}
impl RichardsWolf {
    pub fn new(ni: f64) -> Self {
        Self {
            ni,
            ..Default::default()
        }
    }
    pub fn accuracy(self, accuracy: Accuracy) -> Self {
        Self { accuracy, ..self }
    }
}

impl RadialIntensity for RichardsWolf {
    fn oversampling(&self) -> usize {
        2
    }
    fn intensity(
        &self,
        optics: &Optics,
        geometry: &Geometry,
        z: usize,
        radius: f64,
    ) -> Result<f64, QuadratureError> {
        let k = optics.wave_number() * self.ni;
        let defocus = geometry.axial_offset(z);
        let integrand = |theta: f64| {
            let (sin, cos) = theta.sin_cos();
            let x = k * sin * radius;
            let apodization = cos.sqrt() * sin;
            let phase = Complex64::from_polar(1., k * defocus * cos);
            [
                phase * apodization * (1. + cos) * bessel::j0(x),
                phase * apodization * sin * bessel::j1(x),
                phase * apodization * (1. - cos) * bessel::j2(x),
            ]
        };
        let upper = (optics.numerical_aperture / self.ni).asin();
        Quadrature::simpson(0., upper, self.accuracy.stable_refinements(STABLE_REFINEMENTS))
            .integrate(&integrand, &VECTORIAL_WEIGHTS)
    }
}

impl PlaneModel for RichardsWolf {
    fn validate(&self, optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Diffraction.validate(geometry)?;
        validation::positive("ni", self.ni)?;
        if optics.numerical_aperture > self.ni {
            return Err(ValidationError::Parameter {
                name: "numerical aperture",
                value: optics.numerical_aperture,
                reason: "must not exceed the immersion refractive index",
            });
        }
        Ok(())
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        diffraction_plane(self, ctx, plane)
    }
}
