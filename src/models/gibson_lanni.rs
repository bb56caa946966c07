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

const SIMPSON_REFINEMENTS: [usize; 4] = [3, 4, 5, 6];
const RIEMANN_REFINEMENTS: [usize; 4] = [3, 3, 5, 7];

/// Quadrature rule of the Gibson & Lanni integral
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integration {
    /// Simpson rule over `[0, min(1, ns/NA)]`
    #[default]
    Simpson,
    /// Left Riemann sum over `[0, 1]`
    Riemann,
}

/// Gibson & Lanni scalar model
///
/// The phase aberration is the optical path difference between the design
/// conditions (subscript `0`) and the experimental conditions of a 3 layers
/// system: sample, coverslip and immersion. The immersion thickness of plane
/// `z` is `ti0` shifted by the axial offset of the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GibsonLanni {
    /// Immersion refractive index
    pub ni: f64,
    /// Immersion refractive index (design value)
    pub ni0: f64,
    /// Sample refractive index
    pub ns: f64,
    /// Coverslip refractive index
    pub ng: f64,
    /// Coverslip refractive index (design value)
    pub ng0: f64,
    /// Coverslip thickness [µm]
    pub tg_um: f64,
    /// Coverslip thickness (design value) [µm]
    pub tg0_um: f64,
    /// Working distance (design value) [µm]
    pub ti0_um: f64,
    /// Axial position of the particle [nm]
    pub particle_position_nm: f64,
    pub accuracy: Accuracy,
    pub integration: Integration,
}
impl Default for GibsonLanni {
    fn default() -> Self {
        Self {
            ni: 1.5,
            ni0: 1.5,
            ns: 1.33,
            ng: 1.5,
            ng0: 1.5,
            tg_um: 170.,
            tg0_um: 170.,
            ti0_um: 150.,
            particle_position_nm: 2000.,
            accuracy: Default::default(),
            integration: Default::default(),
        }
    }
}
impl GibsonLanni {
    /// Model with identical design and experimental immersion index `ni`
    pub fn new(ni: f64, ns: f64) -> Self {
        Self {
            ni,
            ni0: ni,
            ns,
            ..Default::default()
        }
    }
    pub fn working_distance(self, ti0_um: f64) -> Self {
        Self { ti0_um, ..self }
    }
    pub fn particle_position(self, particle_position_nm: f64) -> Self {
        Self {
            particle_position_nm,
            ..self
        }
    }
    pub fn coverslip(self, ng: f64, tg_um: f64) -> Self {
        Self { ng, tg_um, ..self }
    }
    pub fn accuracy(self, accuracy: Accuracy) -> Self {
        Self { accuracy, ..self }
    }
    pub fn integration(self, integration: Integration) -> Self {
        Self {
            integration,
            ..self
        }
    }
    /// Optical path difference [m] at the normalized pupil radius `rho`
    pub fn opd(&self, na: f64, rho: f64, ti: f64) -> f64 {
        let layer = |n: f64, t: f64| n * t * (1. - (na * rho / n).powi(2)).sqrt();
        layer(self.ns, self.particle_position_nm * 1e-9)
            + layer(self.ng, self.tg_um * 1e-6)
            + layer(self.ni, ti)
            - layer(self.ng0, self.tg0_um * 1e-6)
            - layer(self.ni0, self.ti0_um * 1e-6)
    }
    fn quadrature(&self, na: f64) -> Quadrature {
        match self.integration {
            Integration::Simpson => Quadrature::simpson(
                0.,
                (self.ns / na).min(1.),
                self.accuracy.stable_refinements(SIMPSON_REFINEMENTS),
            ),
            Integration::Riemann => Quadrature::riemann(
                0.,
                1.,
                self.accuracy.stable_refinements(RIEMANN_REFINEMENTS),
            ),
        }
    }
}

impl RadialIntensity for GibsonLanni {
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
        let k0 = optics.wave_number();
        let na = optics.numerical_aperture;
        let ti = self.ti0_um * 1e-6 + geometry.axial_offset(z);
        let kr = k0 * na * radius;
        let integrand = |rho: f64| {
            [Complex64::from_polar(
                bessel::j0(kr * rho) * rho,
                k0 * self.opd(na, rho, ti),
            )]
        };
        self.quadrature(na).integrate(&integrand, &[1.])
    }
}

impl PlaneModel for GibsonLanni {
    fn validate(&self, _optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Diffraction.validate(geometry)?;
        validation::positive("ni", self.ni)?;
        validation::positive("ni0", self.ni0)?;
        validation::positive("ns", self.ns)?;
        validation::positive("ng", self.ng)?;
        validation::positive("ng0", self.ng0)?;
        validation::finite("tg", self.tg_um)?;
        validation::finite("tg0", self.tg0_um)?;
        validation::finite("ti0", self.ti0_um)?;
        validation::finite("particle position", self.particle_position_nm)
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        diffraction_plane(self, ctx, plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn design_conditions_cancel() {
        let model = GibsonLanni::default().particle_position(0.);
        for rho in [0., 0.3, 0.9] {
            assert_abs_diff_eq!(model.opd(1.4, rho, 150e-6), 0., epsilon = 1e-18);
        }
    }

    #[test]
    fn opd_of_the_particle_depth() {
        let model = GibsonLanni::default();
        assert_abs_diff_eq!(model.opd(1.4, 0., 150e-6), 1.33 * 2000e-9, epsilon = 1e-15);
    }

    #[test]
    fn immersion_below_aperture_is_not_finite() {
        let model = GibsonLanni::new(1., 1.33);
        let err = model
            .intensity(&Optics::default(), &Geometry::new(8, 8, 3), 1, 0.)
            .unwrap_err();
        assert!(matches!(err, QuadratureError::NonFinite { .. }));
    }

    #[test]
    fn riemann_and_simpson_agree() {
        let optics = Optics::new(1.2, 610.);
        let geometry = Geometry::new(8, 8, 3);
        let simpson = GibsonLanni::default().accuracy(Accuracy::Best);
        let riemann = simpson.integration(Integration::Riemann);
        // the Simpson sums are not divided by 3
        let a = simpson.intensity(&optics, &geometry, 1, 100e-9).unwrap() / 9.;
        let b = riemann.intensity(&optics, &geometry, 1, 100e-9).unwrap();
        assert!((a - b).abs() / a < 0.2, "{a} vs {b}");
    }
}
