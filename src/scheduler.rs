//! Concurrent computation of the planes of a volume
//!
//! Each plane is an independent task writing only its own slot of the volume.
//! The first task failure cancels the sibling tasks, a cancelled task returns
//! without writing anything else.

use crossbeam_channel::Sender;
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

use crate::{
    cancel::CancellationToken,
    config::{Geometry, Optics},
    engine::Progress,
    models::{ModelError, PlaneContext, PlaneModel},
    volume::Volume,
};

/// Progress reported when the computation starts
pub const STARTING: f64 = 1.;
/// Progress reported when the volume is allocated
pub const INITIALIZED: f64 = 4.;
/// Progress reported when the planes are dispatched
pub const EXECUTING: f64 = 5.;
/// Progress share of the planes
pub const PLANES: f64 = 90.;

/// Progress reports sink
pub(crate) struct Reporter<'a> {
    sender: Option<&'a Sender<Progress>>,
    planes: AtomicUsize,
}
impl<'a> Reporter<'a> {
    pub fn new(sender: Option<&'a Sender<Progress>>) -> Self {
        Self {
            sender,
            planes: AtomicUsize::new(0),
        }
    }
    pub fn report<S: Into<String>>(&self, percent: f64, message: S) {
        let message = message.into();
        log::debug!("{:5.1}% {}", percent, message);
        if let Some(sender) = self.sender {
            // the receiver may be gone, the computation carries on regardless
            let _ = sender.send(Progress { percent, message });
        }
    }
    fn plane_done(&self, z: usize, nz: usize) {
        let done = self.planes.fetch_add(1, Ordering::Relaxed) + 1;
        self.report(
            EXECUTING + PLANES * done as f64 / nz as f64,
            format!("{} / {}", z, nz),
        );
    }
}

/// How the plane tasks ended
#[derive(Debug)]
pub enum Completion {
    Done,
    Cancelled,
    Failed { z: usize, source: ModelError },
}

/// Worker pool running the plane tasks
pub struct Scheduler {
    pool: rayon::ThreadPool,
}
impl Scheduler {
    /// Pool with `workers` threads, rayon default if `None`
    pub fn new(workers: Option<usize>) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or_default())
            .thread_name(|i| format!("psf-plane-{i}"))
            .build()?;
        Ok(Self { pool })
    }
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
    /// Computes all the planes of `volume`, blocking until every task returned
    pub(crate) fn run<M>(
        &self,
        model: &M,
        optics: &Optics,
        geometry: &Geometry,
        cancel: &CancellationToken,
        volume: &mut Volume,
        progress: &Reporter,
    ) -> Completion
    where
        M: PlaneModel + Sync + ?Sized,
    {
        let nz = geometry.nz;
        let failure: OnceLock<(usize, ModelError)> = OnceLock::new();
        self.pool.install(|| {
            volume
                .data_mut()
                .par_chunks_mut(geometry.plane_len())
                .enumerate()
                .for_each(|(z, plane)| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let ctx = PlaneContext {
                        z,
                        optics,
                        geometry,
                        cancel,
                    };
                    let result = model.compute_plane(&ctx, plane).and_then(|_| {
                        if plane.iter().all(|v| v.is_finite()) {
                            Ok(())
                        } else {
                            Err(ModelError::NonFinite)
                        }
                    });
                    match result {
                        Ok(()) => {
                            log::debug!("plane #{z} done");
                            progress.plane_done(z, nz);
                        }
                        Err(ModelError::Cancelled) => {
                            log::debug!("plane #{z} cancelled");
                        }
                        Err(source) => {
                            log::warn!("plane #{z} failed: {source}");
                            let _ = failure.set((z, source));
                            cancel.cancel();
                        }
                    }
                });
        });
        match failure.into_inner() {
            Some((z, source)) => Completion::Failed { z, source },
            None if cancel.is_cancelled() => Completion::Cancelled,
            None => Completion::Done,
        }
    }
}
