/*!
# PSF generator

Simulated 3D point spread functions of fluorescence microscopes.

A [PsfEngine] computes the `nz` planes of a [Volume] of `nx*ny` intensities
with one of the PSF [Model]s, derives the volume [Statistics] and rescales the
intensities:

```no_run
use psf_generator::{Accuracy, Config, Geometry, GibsonLanni, Optics, PsfEngine, Scale};

let config = Config::new(Optics::new(1.4, 610.), Geometry::new(128, 128, 65))
    .scale(Scale::Sqrt);
let model = GibsonLanni::default().accuracy(Accuracy::Better);
let volume = PsfEngine::new(model, config).run()?.volume();
# Ok::<(), psf_generator::ValidationError>(())
```
*/

pub mod bessel;
mod cancel;
mod config;
mod engine;
mod error;
pub mod models;
pub mod otf;
pub mod quadrature;
pub mod radial;
mod scheduler;
mod validation;
pub mod volume;

pub use cancel::CancellationToken;
pub use config::{Config, FwhmWalk, Geometry, Optics, Scale};
pub use engine::{Event, Events, Outcome, Progress, PsfEngine, PsfJob};
pub use error::{Error, Result};
pub use models::{
    Accuracy, BornWolf, DefocusPlane, GibsonLanni, Integration, Koehler, LateralShape,
    LensDefocus, Model, ModelError, ModelFamily, ModelKind, PlaneContext, PlaneModel,
    RadialIntensity, RiVariation, RichardsWolf, TorokVarga, VariableRiGibsonLanni, ZFunction,
};
pub use validation::ValidationError;
pub use volume::{Fwhm, PlaneStatistics, Statistics, Summary, Volume, VolumeError, Voxel};
