//! Acquisition and output settings shared by every model

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use strum_macros::EnumIter;

use crate::validation::{self, ValidationError};

/// Microscope objective
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Optics {
    /// Numerical aperture
    pub numerical_aperture: f64,
    /// Emission wavelength [nm]
    pub wavelength_nm: f64,
}
impl Default for Optics {
    fn default() -> Self {
        Self {
            numerical_aperture: 1.4,
            wavelength_nm: 610.,
        }
    }
}
impl Optics {
    pub fn new(numerical_aperture: f64, wavelength_nm: f64) -> Self {
        Self {
            numerical_aperture,
            wavelength_nm,
        }
    }
    /// Wavelength [m]
    pub fn wavelength(&self) -> f64 {
        self.wavelength_nm * 1e-9
    }
    /// Vacuum wave number [1/m]
    pub fn wave_number(&self) -> f64 {
        2. * PI / self.wavelength()
    }
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::positive("numerical aperture", self.numerical_aperture)?;
        validation::positive("wavelength", self.wavelength_nm)
    }
}

/// Voxel grid of the simulated volume
///
/// Planes are stored row-major, the linear index within a plane being `x + nx * y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Lateral pixel pitch [nm]
    pub pixel_size_nm: f64,
    /// Axial step between planes [nm]
    pub z_step_nm: f64,
}
impl Default for Geometry {
    fn default() -> Self {
        Self {
            nx: 256,
            ny: 256,
            nz: 65,
            pixel_size_nm: 100.,
            z_step_nm: 250.,
        }
    }
}
impl Geometry {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            ..Default::default()
        }
    }
    pub fn pixel_size(self, pixel_size_nm: f64) -> Self {
        Self {
            pixel_size_nm,
            ..self
        }
    }
    pub fn z_step(self, z_step_nm: f64) -> Self {
        Self { z_step_nm, ..self }
    }
    /// Number of voxels in one plane
    pub fn plane_len(&self) -> usize {
        self.nx * self.ny
    }
    /// Number of voxels in the volume
    pub fn len(&self) -> usize {
        self.plane_len() * self.nz
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Lateral pixel pitch [m]
    pub fn lateral_pitch(&self) -> f64 {
        self.pixel_size_nm * 1e-9
    }
    /// Axial step [m]
    pub fn axial_step(&self) -> f64 {
        self.z_step_nm * 1e-9
    }
    /// Signed axial distance [m] of plane `z` from the middle of the stack
    pub fn axial_offset(&self, z: usize) -> f64 {
        self.axial_step() * (z as f64 - (self.nz as f64 - 1.) / 2.)
    }
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::positive("pixel size", self.pixel_size_nm)?;
        validation::positive("z step", self.z_step_nm)
    }
}

/// Intensity mapping applied in place once the statistics are known
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum Scale {
    /// v / max
    #[default]
    Linear,
    /// ln(v / max)
    Log,
    /// sqrt(v / max)
    Sqrt,
    /// 20 log10(v / max)
    Decibel,
}

/// Direction of the axis walks of the FWHM estimate
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FwhmWalk {
    /// Walk both ways from the maximum along each axis
    #[default]
    Bidirectional,
    /// Walk toward increasing indices only, the lower bound stays at the maximum
    Legacy,
}

/// PSF computation settings
///
/// ```
/// use psf_generator::{Config, Geometry, Optics, Scale};
///
/// let config = Config::new(Optics::new(1.4, 610.), Geometry::new(64, 64, 33))
///     .scale(Scale::Sqrt)
///     .workers(4);
/// assert_eq!(config.geometry.plane_len(), 64 * 64);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub optics: Optics,
    pub geometry: Geometry,
    pub scale: Scale,
    pub fwhm_walk: FwhmWalk,
    /// Size of the worker pool, rayon picks one if `None`
    pub workers: Option<usize>,
}
impl Config {
    pub fn new(optics: Optics, geometry: Geometry) -> Self {
        Self {
            optics,
            geometry,
            ..Default::default()
        }
    }
    pub fn scale(self, scale: Scale) -> Self {
        Self { scale, ..self }
    }
    pub fn fwhm_walk(self, fwhm_walk: FwhmWalk) -> Self {
        Self { fwhm_walk, ..self }
    }
    pub fn workers(self, workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..self
        }
    }
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.optics.validate()?;
        self.geometry.validate()?;
        if let Some(0) = self.workers {
            return Err(ValidationError::Parameter {
                name: "workers",
                value: 0.,
                reason: "the worker pool needs at least one thread",
            });
        }
        Ok(())
    }
}
