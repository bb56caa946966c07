use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{ModelError, ModelFamily, PlaneContext, PlaneModel};
use crate::{
    config::{Geometry, Optics},
    otf,
    validation::{self, ValidationError},
};

/// Köhler illumination blur of a brightfield microscope
///
/// The transfer function is `exp(-ω²σ²/2)` with `σ = n0 + n1|d + z|`, the
/// out-of-focus distance `d` varies linearly from `top` to `mid` on the
/// middle plane `(nz-1)/2` and to `bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Koehler {
    pub n0: f64,
    pub n1: f64,
    /// Out-of-focus distance of the first plane [µm]
    pub top_um: f64,
    /// Out-of-focus distance of the middle plane [µm]
    pub mid_um: f64,
    /// Out-of-focus distance of the last plane [µm]
    pub bottom_um: f64,
}
impl Default for Koehler {
    fn default() -> Self {
        Self {
            n0: 1.5,
            n1: 1.0,
            top_um: 6.,
            mid_um: 3.,
            bottom_um: 6.,
        }
    }
}
impl Koehler {
    pub fn new(n0: f64, n1: f64) -> Self {
        Self {
            n0,
            n1,
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
    /// Out-of-focus distance of plane `z`
    pub fn defocus(&self, z: usize, nz: usize) -> f64 {
        let z0 = (nz as f64 - 1.) / 2.;
        let z = z as f64;
        if z < z0 {
            let r = (z0 - z) / z0;
            self.mid_um * (1. - r) + self.top_um * r
        } else {
            let r = (z - z0) / z0;
            self.mid_um * (1. - r) + self.bottom_um * r
        }
    }
    /// Width of the transfer function of plane `z`
    pub fn sigma(&self, z: usize, nz: usize) -> f64 {
        self.n0 + self.n1 * (self.defocus(z, nz) + z as f64).abs()
    }
}

impl PlaneModel for Koehler {
    fn validate(&self, _optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::Fourier.validate(geometry)?;
        validation::finite("n0", self.n0)?;
        validation::finite("n1", self.n1)?;
        validation::finite("top defocus", self.top_um)?;
        validation::finite("middle defocus", self.mid_um)?;
        validation::finite("bottom defocus", self.bottom_um)
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        let Geometry { nx, ny, nz, .. } = *ctx.geometry;
        let sigma = self.sigma(ctx.z, nz);
        let (xsize, ysize) = ((nx / 2 + 1) as f64, (ny / 2 + 1) as f64);
        let transfer = |x: usize, y: usize| {
            let wr = (PI * x as f64 / xsize).hypot(PI * y as f64 / ysize);
            (-wr * wr * sigma * sigma / 2.).exp()
        };
        otf::synthesize(nx, ny, ctx.cancel, transfer, plane)
    }
}
