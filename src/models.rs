/*!
# PSF models

A model computes one plane of the volume at a time: the planes are independent
and computed concurrently on the worker pool of the [PsfEngine](crate::PsfEngine).

The models belong to three families:
 - [ModelFamily::Diffraction]: the intensity at a distance from the optical axis
   is given by one or three Kirchhoff diffraction integrals, the planes are
   reconstructed from a [RadialProfile] table,
 - [ModelFamily::TensorProduct]: a lateral function scaled by an axial defocus factor,
 - [ModelFamily::Fourier]: the inverse transform of an optical transfer function.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumIter;

use crate::{
    cancel::CancellationToken,
    config::{Geometry, Optics},
    quadrature::QuadratureError,
    radial::RadialProfile,
    validation::{self, ValidationError},
};

mod born_wolf;
mod defocus_plane;
mod gibson_lanni;
mod koehler;
mod lens_defocus;
mod richards_wolf;
mod torok_varga;
mod vri_gibson_lanni;

pub use born_wolf::BornWolf;
pub use defocus_plane::{DefocusPlane, LateralShape, ZFunction};
pub use gibson_lanni::{GibsonLanni, Integration};
pub use koehler::Koehler;
pub use lens_defocus::LensDefocus;
pub use richards_wolf::RichardsWolf;
pub use torok_varga::TorokVarga;
pub use vri_gibson_lanni::{RiVariation, VariableRiGibsonLanni};

/// Plane computation failures
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("plane computation cancelled")]
    Cancelled,
    #[error("diffraction integral failed at r={radius:e}m")]
    Quadrature {
        radius: f64,
        #[source]
        source: QuadratureError,
    },
    #[error("the plane has non-finite values")]
    NonFinite,
    #[error("the plane cannot be normalized by its integral ({0})")]
    Degenerate(f64),
}

/// Convergence strictness of the diffraction integrals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum Accuracy {
    Fast,
    #[default]
    Good,
    Better,
    Best,
}
impl Accuracy {
    /// Picks the number of consecutive stable refinements from a `[Fast, Good, Better, Best]` table
    pub fn stable_refinements(self, table: [usize; 4]) -> usize {
        match self {
            Accuracy::Fast => table[0],
            Accuracy::Good => table[1],
            Accuracy::Better => table[2],
            Accuracy::Best => table[3],
        }
    }
}
impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accuracy::Fast => write!(f, "Fast"),
            Accuracy::Good => write!(f, "Good"),
            Accuracy::Better => write!(f, "Better"),
            Accuracy::Best => write!(f, "Best"),
        }
    }
}

/// Everything a plane task needs besides the model parameters
#[derive(Debug, Clone, Copy)]
pub struct PlaneContext<'a> {
    /// Plane index
    pub z: usize,
    pub optics: &'a Optics,
    pub geometry: &'a Geometry,
    pub cancel: &'a CancellationToken,
}

/// Model contract
pub trait PlaneModel {
    /// Checks the model parameters and the volume geometry
    fn validate(&self, optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError>;
    /// Writes the `nx*ny` intensities of plane `ctx.z` into `plane`
    ///
    /// The cancellation token is polled at least once per row or radius sample,
    /// [ModelError::Cancelled] is returned as soon as it is set.
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError>;
}

/// Rotationally symmetric intensity of the diffraction models
pub trait RadialIntensity {
    /// Number of radius samples per pixel
    fn oversampling(&self) -> usize;
    /// Intensity at `radius` [m] from the optical axis in plane `z`
    fn intensity(
        &self,
        optics: &Optics,
        geometry: &Geometry,
        z: usize,
        radius: f64,
    ) -> Result<f64, QuadratureError>;
}

/// Plane reconstruction of the diffraction models
pub(crate) fn diffraction_plane<M: RadialIntensity>(
    model: &M,
    ctx: &PlaneContext,
    plane: &mut [f64],
) -> Result<(), ModelError> {
    let Geometry { nx, ny, .. } = *ctx.geometry;
    let pitch = ctx.geometry.lateral_pitch();
    let profile = RadialProfile::build(nx, ny, model.oversampling(), ctx.cancel, |r| {
        let radius = r * pitch;
        model
            .intensity(ctx.optics, ctx.geometry, ctx.z, radius)
            .map_err(|source| ModelError::Quadrature { radius, source })
    })?;
    profile.render(nx, ctx.cancel, plane)
}

/// Model families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Diffraction,
    TensorProduct,
    Fourier,
}
impl ModelFamily {
    /// Geometry constraints shared by the models of a family
    pub fn validate(&self, geometry: &Geometry) -> Result<(), ValidationError> {
        validation::min_planes(geometry.nz, 3)?;
        validation::min_pixels("nx", geometry.nx, 4)?;
        validation::min_pixels("ny", geometry.ny, 4)?;
        if let ModelFamily::Fourier = self {
            validation::power_of_two("nx", geometry.nx)?;
            validation::power_of_two("ny", geometry.ny)?;
        }
        Ok(())
    }
}

/// Model identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum ModelKind {
    BornWolf,
    GibsonLanni,
    TorokVarga,
    VariableRiGibsonLanni,
    RichardsWolf,
    DefocusPlane,
    LensDefocus,
    Koehler,
}
impl ModelKind {
    pub fn family(&self) -> ModelFamily {
        use ModelKind::*;
        match self {
            BornWolf | GibsonLanni | TorokVarga | VariableRiGibsonLanni | RichardsWolf => {
                ModelFamily::Diffraction
            }
            DefocusPlane => ModelFamily::TensorProduct,
            LensDefocus | Koehler => ModelFamily::Fourier,
        }
    }
    /// Model with default parameters
    pub fn model(&self) -> Model {
        match self {
            ModelKind::BornWolf => BornWolf::default().into(),
            ModelKind::GibsonLanni => GibsonLanni::default().into(),
            ModelKind::TorokVarga => TorokVarga::default().into(),
            ModelKind::VariableRiGibsonLanni => VariableRiGibsonLanni::default().into(),
            ModelKind::RichardsWolf => RichardsWolf::default().into(),
            ModelKind::DefocusPlane => DefocusPlane::default().into(),
            ModelKind::LensDefocus => LensDefocus::default().into(),
            ModelKind::Koehler => Koehler::default().into(),
        }
    }
}
impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ModelKind::*;
        match self {
            BornWolf => write!(f, "Born & Wolf 3D Optical Model"),
            GibsonLanni => write!(f, "Gibson & Lanni 3D Optical Model"),
            TorokVarga => write!(f, "Torok & Varga 3D Optical Model"),
            VariableRiGibsonLanni => write!(f, "Variable RI Gibson & Lanni 3D Optical Model"),
            RichardsWolf => write!(f, "Richards & Wolf 3D Optical Model"),
            DefocusPlane => write!(f, "Lateral and Axial Definition"),
            LensDefocus => write!(f, "Defocussing Lens - OTF Definition"),
            Koehler => write!(f, "Koehler Illumination - OTF Definition"),
        }
    }
}

/// PSF model with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Model {
    BornWolf(BornWolf),
    GibsonLanni(GibsonLanni),
    TorokVarga(TorokVarga),
    VariableRiGibsonLanni(VariableRiGibsonLanni),
    RichardsWolf(RichardsWolf),
    DefocusPlane(DefocusPlane),
    LensDefocus(LensDefocus),
    Koehler(Koehler),
}
impl Default for Model {
    fn default() -> Self {
        Model::BornWolf(Default::default())
    }
}
impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::BornWolf(_) => ModelKind::BornWolf,
            Model::GibsonLanni(_) => ModelKind::GibsonLanni,
            Model::TorokVarga(_) => ModelKind::TorokVarga,
            Model::VariableRiGibsonLanni(_) => ModelKind::VariableRiGibsonLanni,
            Model::RichardsWolf(_) => ModelKind::RichardsWolf,
            Model::DefocusPlane(_) => ModelKind::DefocusPlane,
            Model::LensDefocus(_) => ModelKind::LensDefocus,
            Model::Koehler(_) => ModelKind::Koehler,
        }
    }
    /// The radial intensity of the diffraction models
    pub fn radial_intensity(&self) -> Option<&(dyn RadialIntensity + Sync)> {
        match self {
            Model::BornWolf(m) => Some(m),
            Model::GibsonLanni(m) => Some(m),
            Model::TorokVarga(m) => Some(m),
            Model::VariableRiGibsonLanni(m) => Some(m),
            Model::RichardsWolf(m) => Some(m),
            Model::DefocusPlane(_) | Model::LensDefocus(_) | Model::Koehler(_) => None,
        }
    }
    fn as_plane_model(&self) -> &(dyn PlaneModel + Sync) {
        match self {
            Model::BornWolf(m) => m,
            Model::GibsonLanni(m) => m,
            Model::TorokVarga(m) => m,
            Model::VariableRiGibsonLanni(m) => m,
            Model::RichardsWolf(m) => m,
            Model::DefocusPlane(m) => m,
            Model::LensDefocus(m) => m,
            Model::Koehler(m) => m,
        }
    }
}
impl PlaneModel for Model {
    fn validate(&self, optics: &Optics, geometry: &Geometry) -> Result<(), ValidationError> {
        self.as_plane_model().validate(optics, geometry)
    }
    fn compute_plane(&self, ctx: &PlaneContext, plane: &mut [f64]) -> Result<(), ModelError> {
        self.as_plane_model().compute_plane(ctx, plane)
    }
}
impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

macro_rules! into_model {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Model {
                fn from(model: $variant) -> Self {
                    Model::$variant(model)
                }
            }
        )*
    };
}
into_model!(
    BornWolf,
    GibsonLanni,
    TorokVarga,
    VariableRiGibsonLanni,
    RichardsWolf,
    DefocusPlane,
    LensDefocus,
    Koehler
);
