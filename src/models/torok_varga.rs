use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    diffraction_plane, richards_wolf::VECTORIAL_WEIGHTS, Accuracy, ModelError, ModelFamily,
    PlaneContext, PlaneModel, RadialIntensity,
};
use crate::{
    bessel,
    config::{Geometry, Optics},
    quadrature::{Quadrature, QuadratureError},
    validation::{self, ValidationError},
};

const STABLE_REFINEMENTS: [usize; 4] = [3, 5, 7, 9];

/// Török & Varga vectorial model
///
/// Vectorial diffraction through the interface between the sample and the
/// immersion medium. The angle in the sample follows from Snell's law and
/// becomes complex beyond the critical angle, the `s` and `p` polarizations
/// are weighted by their Fresnel transmission coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorokVarga {
    /// Immersion refractive index
    pub ni: f64,
    /// Sample refractive index
    pub ns: f64,
    /// Working distance (design value) [µm]
    pub ti0_um: f64,
    /// Axial position of the particle [nm]
    pub particle_position_nm: f64,
    pub accuracy: Accuracy,
}
impl Default for TorokVarga {
    fn default() -> Self {
        Self {
            ni: 1.5,
            ns: 1.0,
            ti0_um: 150.,
            particle_position_nm: 2000.,
            accuracy: Default::default(),
        }
    }
}
impl TorokVarga {
    pub fn new(ni: f64, ns: f64) -> Self {
        Self {
            ni,
            ns,
            ..Default::default()
        }
    }
    pub fn particle_position(self, particle_position_nm: f64) -> Self {
        Self {
            particle_position_nm,
            ..self
        }
    }
    pub fn accuracy(self, accuracy: Accuracy) -> Self {
        Self { accuracy, ..self }
    }
}

impl RadialIntensity for TorokVarga {
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
        let (ni, ns) = (self.ni, self.ns);
        let k0 = optics.wave_number();
        let k = k0 * ni;
        let zp = self.particle_position_nm * 1e-9;
        // ti - ti0
        let dti = geometry.axial_offset(z);
        let integrand = |theta: f64| {
            let (sin, cos) = theta.sin_cos();
            let sin_s = ni * sin / ns;
            let cos_s = Complex64::new(1. - sin_s * sin_s, 0.).sqrt();
            let ts = 2. * ns * cos_s / (ns * cos_s + ni * cos);
            let tp = 2. * ns * cos_s / (ni * cos_s + ns * cos);
            let x = k * sin * radius;
            let apodization = cos.sqrt() * sin;
            let phase = (Complex64::i() * k0 * (ns * zp * cos_s + ni * dti * cos)).exp();
            [
                phase * apodization * (ts + tp * cos_s) * bessel::j0(x),
                phase * apodization * tp * sin_s * bessel::j1(x),
                phase * apodization * (ts - tp * cos_s) * bessel::j2(x),
            ]
        };
        let upper = (optics.numerical_aperture / ni).asin();
        Quadrature::simpson(0., upper, self.accuracy.stable_refinements(STABLE_REFINEMENTS))
            .integrate(&integrand, &VECTORIAL_WEIGHTS)
    }
}

impl PlaneModel for TorokVarga {
    fn validate(&self, optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Diffraction.validate(geometry)?;
        validation::positive("ni", self.ni)?;
        validation::positive("ns", self.ns)?;
        validation::finite("ti0", self.ti0_um)?;
        validation::finite("particle position", self.particle_position_nm)?;
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
