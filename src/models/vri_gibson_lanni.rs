use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

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

/// Refractive index profile across the sample thickness
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum RiVariation {
    #[default]
    Linear,
    Logarithmic,
    Exponential,
}
impl RiVariation {
    /// Refractive indices of the `layers` sample layers, from `ns0` at the
    /// coverslip toward `nsz` at the particle depth
    pub fn profile(&self, ns0: f64, nsz: f64, layers: usize) -> Vec<f64> {
        let n = layers as f64;
        match self {
            RiVariation::Linear => {
                let a = (nsz - ns0) / n;
                (0..layers).map(|l| a * l as f64 + ns0).collect()
            }
            RiVariation::Logarithmic => {
                let b = ns0.exp();
                let a = (nsz.exp() - b) / n;
                (0..layers).map(|l| (a * l as f64 + b).ln()).collect()
            }
            RiVariation::Exponential => {
                let b = ns0.ln();
                let a = (nsz.ln() - b) / n;
                (0..layers).map(|l| (a * l as f64 + b).exp()).collect()
            }
        }
    }
}

/// Gibson & Lanni model with a refractive index varying with depth in the sample
///
/// The sample above the particle is sliced in `ceil(zp/Δz)` layers, each layer
/// adding one lateral pitch of optical path at its own refractive index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableRiGibsonLanni {
    /// Immersion refractive index
    pub ni: f64,
    /// Sample refractive index at the coverslip
    pub ns0: f64,
    /// Sample refractive index at the particle depth
    pub nsz: f64,
    pub variation: RiVariation,
    /// Working distance (design value) [µm]
    pub ti0_um: f64,
    /// Axial position of the particle [nm]
    pub particle_position_nm: f64,
    pub accuracy: Accuracy,
}
impl Default for VariableRiGibsonLanni {
    fn default() -> Self {
        Self {
            ni: 1.5,
            ns0: 1.33,
            nsz: 1.4,
            variation: Default::default(),
            ti0_um: 150.,
            particle_position_nm: 2000.,
            accuracy: Default::default(),
        }
    }
}
impl VariableRiGibsonLanni {
    pub fn new(ns0: f64, nsz: f64, variation: RiVariation) -> Self {
        Self {
            ns0,
            nsz,
            variation,
            ..Default::default()
        }
    }
    pub fn accuracy(self, accuracy: Accuracy) -> Self {
        Self { accuracy, ..self }
    }
    /// Number of sample layers above the particle
    pub fn layers(&self, geometry: &Geometry) -> usize {
        let layers = (self.particle_position_nm / geometry.z_step_nm).ceil();
        if layers > 0. {
            layers as usize
        } else {
            0
        }
    }
}

impl RadialIntensity for VariableRiGibsonLanni {
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
        let ni = self.ni;
        let dti = geometry.axial_offset(z);
        let kr = k0 * na * radius;
        let pitch = geometry.lateral_pitch();
        let profile = self
            .variation
            .profile(self.ns0, self.nsz, self.layers(geometry));
        let integrand = |rho: f64| {
            let sample: f64 = profile.iter().map(|n| (n - na * rho).abs().sqrt()).sum();
            let opd = pitch * sample + ni * dti * (1. - (na * rho / ni).powi(2)).sqrt();
            [Complex64::from_polar(bessel::j0(kr * rho) * rho, k0 * opd)]
        };
        Quadrature::simpson(
            0.,
            (ni / na).min(1.),
            self.accuracy.stable_refinements(STABLE_REFINEMENTS),
        )
        .integrate(&integrand, &[1.])
    }
}

impl PlaneModel for VariableRiGibsonLanni {
    fn validate(&self, _optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Diffraction.validate(geometry)?;
        validation::positive("ni", self.ni)?;
        validation::positive("ns0", self.ns0)?;
        validation::positive("nsz", self.nsz)?;
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
    use strum::IntoEnumIterator;

    #[test]
    fn profiles_start_at_the_coverslip_index() {
        for variation in RiVariation::iter() {
            let profile = variation.profile(1.33, 1.4, 8);
            assert_eq!(profile.len(), 8);
            assert_abs_diff_eq!(profile[0], 1.33, epsilon = 1e-12);
            assert!(profile.windows(2).all(|w| w[1] > w[0]), "{variation:?}");
            assert!(profile[7] < 1.4);
        }
    }

    #[test]
    fn layers_follow_the_particle_depth() {
        let geometry = Geometry::new(8, 8, 3).z_step(250.);
        let model = VariableRiGibsonLanni::default();
        assert_eq!(model.layers(&geometry), 8);
        let model = VariableRiGibsonLanni {
            particle_position_nm: -100.,
            ..model
        };
        assert_eq!(model.layers(&geometry), 0);
    }

    #[test]
    fn surface_particle_is_finite() {
        let model = VariableRiGibsonLanni {
            particle_position_nm: 0.,
            ..Default::default()
        };
        let value = model
            .intensity(&Optics::default(), &Geometry::new(8, 8, 3), 1, 0.)
            .unwrap();
        assert!(value > 0.);
    }
}
