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

/// Born & Wolf scalar model
///
/// Paraxial defocus of an aberration-free objective: the defocus of plane `z`
/// is its axial distance to the middle of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BornWolf {
    /// Immersion refractive index
    pub ni: f64,
    pub accuracy: Accuracy,
}
impl Default for BornWolf {
    fn default() -> Self {
        Self {
            ni: 1.5,
            accuracy: Default::default(),
        }
    }
}
impl BornWolf {
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

impl RadialIntensity for BornWolf {
    fn oversampling(&self) -> usize {
        1
    }
    fn intensity(
        &self,
        optics: &Optics,
        geometry: &Geometry,
        z: usize,
        radius: f64,
    ) -> Result<f64, QuadratureError> {
        let k0 = optics.wave_number();
        let na = optics.numerical_aperture;
        let defocus = geometry.axial_offset(z);
        let kr = k0 * na * radius;
        let w = k0 * na * na * defocus / (2. * self.ni);
        let integrand =
            |rho: f64| [Complex64::from_polar(bessel::j0(kr * rho) * rho, -w * rho * rho)];
        Quadrature::simpson(0., 1., self.accuracy.stable_refinements(STABLE_REFINEMENTS))
            .integrate(&integrand, &[1.])
    }
}

impl PlaneModel for BornWolf {
    fn validate(&self, _optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Diffraction.validate(geometry)?;
        validation::positive("ni", self.ni)
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        diffraction_plane(self, ctx, plane)
    }
}
