use crate::{models::ModelError, validation::ValidationError, volume::VolumeError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid settings")]
    Validation(#[from] ValidationError),
    #[error("failed to compute plane #{z}")]
    Plane {
        z: usize,
        #[source]
        source: ModelError,
    },
    #[error("Error in the `volume` module")]
    Volume(#[from] VolumeError),
    #[error("failed to build the worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("the PSF computation ended without reporting an outcome")]
    Worker,
}
pub type Result<T> = std::result::Result<T, Error>;
