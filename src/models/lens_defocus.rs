use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{ModelError, ModelFamily, PlaneContext, PlaneModel};
use crate::{
    config::{Geometry, Optics},
    otf,
    validation::{self, ValidationError},
};

/// Defocussing lens blur defined by its optical transfer function
///
/// The defocus distance varies linearly from `top` on the first plane to `mid`
/// on plane `nz/2` and to `bottom` on the last plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensDefocus {
    /// Distance to the image plane [µm]
    pub zi_um: f64,
    /// Lens constant [µm]
    pub k_um: f64,
    /// Defocus of the first plane [µm]
    pub top_um: f64,
    /// Defocus of the middle plane [µm]
    pub mid_um: f64,
    /// Defocus of the last plane [µm]
    pub bottom_um: f64,
}
impl Default for LensDefocus {
    fn default() -> Self {
        Self {
            zi_um: 2000.,
            k_um: 275.,
            top_um: 30.,
            mid_um: 1.,
            bottom_um: 30.,
        }
    }
}
impl LensDefocus {
    pub fn new(zi_um: f64, k_um: f64) -> Self {
        Self {
            zi_um,
            k_um,
            ..Default::default()
        }
    }
    pub fn defocus_range(self, top_um: f64, mid_um: f64, bottom_um: f64) -> Self {
        Self {
            top_um,
            mid_um,
            bottom_um,
            ..self
        }
    }
    /// Defocus [µm] of plane `z`
    pub fn defocus(&self, z: usize, nz: usize) -> f64 {
        let n = nz / 2;
        if z < n {
            let r = (n - z) as f64 / n as f64;
            self.mid_um * (1. - r) + self.top_um * r
        } else if z > n {
            let r = (z - n) as f64 / n as f64;
            self.mid_um * (1. - r) + self.bottom_um * r
        } else {
            self.mid_um
        }
    }
}

impl PlaneModel for LensDefocus {
    fn validate(&self, _optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Fourier.validate(geometry)?;
        validation::positive("K", self.k_um)?;
        validation::finite("zi", self.zi_um)?;
        validation::finite("top defocus", self.top_um)?;
        validation::finite("middle defocus", self.mid_um)?;
        validation::finite("bottom defocus", self.bottom_um)
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        let Geometry { nx, ny, nz, .. } = *ctx.geometry;
        let d = self.defocus(ctx.z, nz) * 1e-6;
        let zi = self.zi_um * 1e-6;
        if d == zi {
            plane.iter_mut().for_each(|v| *v = 0.);
            return Ok(());
        }
        let wm = (d / (zi - d)) / (self.k_um * 1e-6);
        let sigma2 = 3f64;
        let (xsize, ysize) = ((nx / 2) as f64, (ny / 2) as f64);
        let transfer = |x: usize, y: usize| {
            let wr = (PI * x as f64 / xsize).hypot(PI * y as f64 / ysize);
            let s = wm * wr * (1. - wr);
            let sinc = if s == 0. { 1. } else { (s.sin() / s).abs() };
            (-sigma2 * wr * wr).exp() * sinc
        };
        otf::synthesize(nx, ny, ctx.cancel, transfer, plane)
    }
}
