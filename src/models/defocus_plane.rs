use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, fmt};
use strum_macros::EnumIter;

use super::{ModelError, ModelFamily, PlaneContext, PlaneModel};
use crate::{
    bessel,
    config::{Geometry, Optics},
    validation::{self, ValidationError},
};

/// FWHM to standard deviation ratio of a Gaussian
const FWHM_TO_SIGMA: f64 = 2.35482005;
/// Half maximum of the Airy pattern at the half FWHM of a Gaussian of unit standard deviation
const AIRY_SCALE: f64 = 1.3729;

/// Axial defocus law
///
/// The defocus factor of plane `z` depends on its distance to the focal plane
/// `zf`, the defocus plane `zd` sets the rate of change (both in planes).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum ZFunction {
    /// `1 + |z-zf| / |zd-zf|`
    #[default]
    Linear,
    /// `exp(-ln2 |z-zf| / (zd-zf))`
    Exponential,
    /// `1 + (z-zf)² / (zd-zf)²`
    Parabolic,
    /// `1`
    Constant,
}
impl ZFunction {
    pub fn defocus_factor(&self, z: f64, zf: f64, zd: f64) -> f64 {
        let za = (z - zf).abs();
        match self {
            ZFunction::Linear => 1. + za / (zd - zf).abs(),
            ZFunction::Exponential => (-za * std::f64::consts::LN_2 / (zd - zf)).exp(),
            ZFunction::Parabolic => 1. + za * za / ((zd - zf) * (zd - zf)),
            ZFunction::Constant => 1.,
        }
    }
}
impl fmt::Display for ZFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZFunction::Linear => write!(f, "Linear"),
            ZFunction::Exponential => write!(f, "Exponential"),
            ZFunction::Parabolic => write!(f, "Parabolic"),
            ZFunction::Constant => write!(f, "Constant"),
        }
    }
}

/// Lateral function of the plane
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum LateralShape {
    #[default]
    Gaussian,
    Lorentz,
    CardinalSine,
    Cosine,
    CircularPupil,
    Astigmatism,
    OrientedGaussian,
    DoubleHelix,
}
impl fmt::Display for LateralShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use LateralShape::*;
        match self {
            Gaussian => write!(f, "Gaussian"),
            Lorentz => write!(f, "Lorentz"),
            CardinalSine => write!(f, "Cardinal-Sine"),
            Cosine => write!(f, "Cosine"),
            CircularPupil => write!(f, "Circular-Pupil"),
            Astigmatism => write!(f, "Astigmatism"),
            OrientedGaussian => write!(f, "Oriented-Gaussian"),
            DoubleHelix => write!(f, "Double-Helix"),
        }
    }
}

/// Lateral function with its width set
#[derive(Debug, Clone, Copy)]
struct Lateral {
    shape: LateralShape,
    /// Reference radius [pixel]
    radius: f64,
    /// Defocus factor
    factor: f64,
    rotation: na::Rotation2<f64>,
}
impl Lateral {
    fn new(shape: LateralShape, radius: f64, factor: f64) -> Self {
        let rotation = match shape {
            LateralShape::OrientedGaussian | LateralShape::DoubleHelix => {
                na::Rotation2::new(-factor)
            }
            _ => na::Rotation2::identity(),
        };
        Self {
            shape,
            radius,
            factor,
            rotation,
        }
    }
    fn gaussian(u: f64, v: f64, su: f64, sv: f64) -> f64 {
        (-0.5 * ((u / su).powi(2) + (v / sv).powi(2))).exp()
    }
    /// Value at `(x,y)` [pixel] from the plane center
    fn eval(&self, x: f64, y: f64) -> f64 {
        let (radius, factor) = (self.radius, self.factor);
        let width = radius * factor;
        let r = x.hypot(y);
        match self.shape {
            LateralShape::Gaussian => Self::gaussian(x, y, width, width),
            LateralShape::Lorentz => 1. / (1. + (r / width).powi(2)),
            LateralShape::CardinalSine => {
                let u = r / width;
                if u == 0. {
                    1.
                } else {
                    (u.sin() / u).powi(2)
                }
            }
            LateralShape::Cosine => {
                let u = r / width;
                if u < 0.5 * PI {
                    u.cos().powi(2)
                } else {
                    0.
                }
            }
            LateralShape::CircularPupil => {
                let v = r * AIRY_SCALE / width;
                if v == 0. {
                    1.
                } else {
                    (2. * bessel::j1(v) / v).powi(2)
                }
            }
            LateralShape::Astigmatism => Self::gaussian(x, y, width, radius),
            LateralShape::OrientedGaussian => {
                let p = self.rotation * na::Vector2::new(x, y);
                Self::gaussian(p.x, p.y, 2. * radius, radius)
            }
            LateralShape::DoubleHelix => {
                let p = self.rotation * na::Vector2::new(x, y);
                let sigma = 0.25 * radius;
                Self::gaussian(p.x - 0.5 * radius, p.y, sigma, sigma)
                    + Self::gaussian(p.x + 0.5 * radius, p.y, sigma, sigma)
            }
        }
    }
}

/// Tensor product of a lateral function and an axial defocus law
///
/// The width of the lateral function is the standard deviation of the Gaussian
/// with the FWHM `0.5λ/NA`, scaled by the defocus factor. Each plane is
/// normalized to a unit integral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefocusPlane {
    pub shape: LateralShape,
    pub zfunction: ZFunction,
    /// Focal plane position [nm]
    pub focus_nm: f64,
    /// Defocus plane position [nm]
    pub defocus_nm: f64,
}
impl Default for DefocusPlane {
    fn default() -> Self {
        Self {
            shape: Default::default(),
            zfunction: Default::default(),
            focus_nm: 0.,
            defocus_nm: 100.,
        }
    }
}
impl DefocusPlane {
    pub fn new(shape: LateralShape, zfunction: ZFunction) -> Self {
        Self {
            shape,
            zfunction,
            ..Default::default()
        }
    }
    pub fn focus(self, focus_nm: f64, defocus_nm: f64) -> Self {
        Self {
            focus_nm,
            defocus_nm,
            ..self
        }
    }
    /// Reference radius [pixel]
    pub fn radius(&self, optics: &Optics, geometry: &Geometry) -> f64 {
        let fwhm = 0.5 * optics.wavelength() / optics.numerical_aperture;
        fwhm / FWHM_TO_SIGMA / geometry.lateral_pitch()
    }
    /// Defocus factor of plane `z`
    pub fn defocus_factor(&self, geometry: &Geometry, z: usize) -> f64 {
        self.zfunction.defocus_factor(
            z as f64,
            self.focus_nm / geometry.z_step_nm,
            self.defocus_nm / geometry.z_step_nm,
        )
    }
}

impl PlaneModel for DefocusPlane {
    fn validate(&self, _optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        ModelFamily::TensorProduct.validate(geometry)?;
        validation::finite("focus", self.focus_nm)?;
        validation::finite("defocus", self.defocus_nm)?;
        if self.focus_nm == self.defocus_nm {
            return Err(ValidationError::Parameter {
                name: "defocus",
                value: self.defocus_nm,
                reason: "must differ from the focus",
            });
        }
        Ok(())
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        let Geometry { nx, ny, .. } = *ctx.geometry;
        let lateral = Lateral::new(
            self.shape,
            self.radius(ctx.optics, ctx.geometry),
            self.defocus_factor(ctx.geometry, ctx.z),
        );
        let (x0, y0) = (nx as f64 * 0.5, ny as f64 * 0.5);
        let mut integral = 0f64;
        for (y, row) in plane.chunks_mut(nx).enumerate() {
            for (x, value) in row.iter_mut().enumerate() {
                *value = lateral.eval(x as f64 - x0, y as f64 - y0);
                integral += *value;
            }
            if ctx.cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
        }
        if !integral.is_finite() {
            return Err(ModelError::NonFinite);
        }
        if integral <= 0. {
            return Err(ModelError::Degenerate(integral));
        }
        plane.iter_mut().for_each(|v| *v /= integral);
        Ok(())
    }
}
