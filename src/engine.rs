/*!
# PSF engine

The engine validates the settings, allocates the volume, computes the planes
on the worker pool, waits for all of them and finally derives the statistics
before rescaling the volume.

[PsfEngine::run] blocks the caller until the volume is done, [PsfEngine::spawn]
returns at once with a [PsfJob] reporting the [Progress] of the computation.

```no_run
use psf_generator::{BornWolf, Config, Geometry, Optics, Outcome, PsfEngine};

let config = Config::new(Optics::new(1.4, 610.), Geometry::new(64, 64, 33));
let engine = PsfEngine::new(BornWolf::default(), config);
match engine.run()? {
    Outcome::Success(volume) => println!("{}", volume.summary().unwrap()),
    Outcome::Failure(e) => eprintln!("{e}"),
    Outcome::Cancelled => eprintln!("cancelled"),
}
# Ok::<(), psf_generator::ValidationError>(())
```

Every computation polls its own [CancellationToken], a child of the engine
token: [PsfEngine::cancel] stops the computations in flight when it is called
but not the ones started afterwards.
*/

use crossbeam_channel::{Receiver, Sender};
use std::{thread, time::Instant};

use crate::{
    cancel::CancellationToken,
    config::Config,
    error::Error,
    models::{Model, PlaneModel},
    scheduler::{self, Completion, Reporter, Scheduler},
    validation::ValidationError,
    volume::Volume,
};

/// Progress report of a computation
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Completion [%]
    pub percent: f64,
    pub message: String,
}

/// Messages of an asynchronous computation, see [PsfJob::into_events]
///
/// `Success`, `Failure` and `Cancelled` are terminal: exactly one of them is
/// delivered, always last.
#[derive(Debug)]
pub enum Event {
    Progress { percent: f64, message: String },
    Success(Box<Volume>),
    Failure(Error),
    Cancelled,
}
impl Event {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Progress { .. })
    }
    /// The outcome carried by a terminal event
    pub fn into_outcome(self) -> Option<Outcome> {
        match self {
            Event::Progress { .. } => None,
            Event::Success(volume) => Some(Outcome::Success(volume)),
            Event::Failure(e) => Some(Outcome::Failure(e)),
            Event::Cancelled => Some(Outcome::Cancelled),
        }
    }
}
impl From<Progress> for Event {
    fn from(Progress { percent, message }: Progress) -> Self {
        Event::Progress { percent, message }
    }
}
impl From<Outcome> for Event {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(volume) => Event::Success(volume),
            Outcome::Failure(e) => Event::Failure(e),
            Outcome::Cancelled => Event::Cancelled,
        }
    }
}

/// How a computation ended
///
/// A cancelled computation is neither a success nor a failure and carries no volume.
#[derive(Debug)]
pub enum Outcome {
    Success(Box<Volume>),
    Failure(Error),
    Cancelled,
}
impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
    /// The volume of a successful computation
    pub fn volume(self) -> Option<Volume> {
        match self {
            Outcome::Success(volume) => Some(*volume),
            _ => None,
        }
    }
}

/// PSF computation of a model
#[derive(Debug, Default)]
pub struct PsfEngine {
    model: Model,
    config: Config,
    cancel: CancellationToken,
}
// a clone gets its own token, cancelling it leaves the computations of the original alone
impl Clone for PsfEngine {
    fn clone(&self) -> Self {
        Self::new(self.model.clone(), self.config.clone())
    }
}
impl PsfEngine {
    pub fn new<M: Into<Model>>(model: M, config: Config) -> Self {
        Self {
            model: model.into(),
            config,
            cancel: CancellationToken::new(),
        }
    }
    pub fn model(&self) -> &Model {
        &self.model
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    /// Checks the settings and the model parameters
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.config.validate()?;
        self.model
            .validate(&self.config.optics, &self.config.geometry)
    }
    /// Computes the volume, blocking until all the planes are done
    ///
    /// The computation is cancelled by [PsfEngine::cancel] calls issued after this one.
    pub fn run(&self) -> Result<Outcome, ValidationError> {
        let cancel = self.cancel.child();
        self.run_with(&cancel)
    }
    /// Computes the volume polling `cancel`, blocking until all the planes are done
    ///
    /// A request issued on `cancel` at any time, even before this call, cancels the computation.
    pub fn run_with(&self, cancel: &CancellationToken) -> Result<Outcome, ValidationError> {
        self.validate()?;
        Ok(execute(&self.model, &self.config, cancel, None))
    }
    /// Computes the volume on a separate thread
    ///
    /// The job is cancelled by [PsfJob::cancel] and by [PsfEngine::cancel]
    /// calls issued after this one.
    pub fn spawn(&self) -> Result<PsfJob, ValidationError> {
        let cancel = self.cancel.child();
        self.validate()?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let model = self.model.clone();
        let config = self.config.clone();
        let job_cancel = cancel.clone();
        let handle = match thread::Builder::new()
            .name("psf-engine".to_string())
            .spawn(move || execute(&model, &config, &job_cancel, Some(&tx)))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to spawn the PSF worker: {e}");
                None
            }
        };
        Ok(PsfJob {
            progress: rx,
            cancel,
            handle,
        })
    }
    /// Requests the computations in flight to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
    /// Token cancelling, from another thread, the computations in flight when it is used
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Handle to an asynchronous computation
///
/// The progress reports stream through [PsfJob::progress], the outcome is
/// returned once by [PsfJob::wait] or as the last of [PsfJob::into_events].
pub struct PsfJob {
    progress: Receiver<Progress>,
    cancel: CancellationToken,
    handle: Option<thread::JoinHandle<Outcome>>,
}
impl PsfJob {
    /// Progress reports, in the order they were sent
    ///
    /// The channel disconnects once the computation has ended.
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
    /// Token cancelling this job only
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
    /// Blocks until the computation ends, the unread progress reports are dropped
    pub fn wait(self) -> Outcome {
        match self.handle.map(thread::JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => {
                log::error!("the PSF worker panicked");
                Outcome::Failure(Error::Worker)
            }
            None => Outcome::Failure(Error::Worker),
        }
    }
    /// Progress events followed by the terminal event
    pub fn into_events(self) -> Events {
        Events { job: Some(self) }
    }
}

/// Iterator over the events of a [PsfJob]
pub struct Events {
    job: Option<PsfJob>,
}
impl Iterator for Events {
    type Item = Event;
    fn next(&mut self) -> Option<Event> {
        let job = self.job.as_ref()?;
        match job.progress.recv() {
            Ok(progress) => Some(progress.into()),
            // the worker dropped the sender, its outcome is ready
            Err(_) => self.job.take().map(|job| job.wait().into()),
        }
    }
}

fn execute(
    model: &Model,
    config: &Config,
    cancel: &CancellationToken,
    sender: Option<&Sender<Progress>>,
) -> Outcome {
    let now = Instant::now();
    let Config {
        optics, geometry, ..
    } = config;
    log::info!(
        "{} ({}x{}x{} voxels)",
        model,
        geometry.nx,
        geometry.ny,
        geometry.nz
    );
    let reporter = Reporter::new(sender);
    reporter.report(scheduler::STARTING, "Starting");

    let scheduler = match Scheduler::new(config.workers) {
        Ok(scheduler) => scheduler,
        Err(e) => return Outcome::Failure(e.into()),
    };
    let mut volume = Volume::new(*optics, *geometry);
    reporter.report(scheduler::INITIALIZED, "Initialized");

    reporter.report(
        scheduler::EXECUTING,
        format!("Executing on {} workers", scheduler.workers()),
    );
    // a failing plane cancels its siblings, not the other holders of `cancel`
    let planes = cancel.child();
    if cancel.is_cancelled() {
        planes.cancel();
    }
    match scheduler.run(model, optics, geometry, &planes, &mut volume, &reporter) {
        Completion::Done => (),
        Completion::Cancelled => {
            log::warn!("{} cancelled after {:?}", model, now.elapsed());
            return Outcome::Cancelled;
        }
        Completion::Failed { z, source } => {
            log::warn!("{} failed after {:?}", model, now.elapsed());
            return Outcome::Failure(Error::Plane { z, source });
        }
    }

    let stats = volume.analyze(config.fwhm_walk);
    log::debug!(
        "maximum {:e} at {:?}, energy {:e}",
        stats.maximum.value,
        (stats.maximum.x, stats.maximum.y, stats.maximum.z),
        stats.energy
    );
    if let Err(e) = volume.rescale(config.scale) {
        return Outcome::Failure(e.into());
    }
    reporter.report(100., "Done");
    log::info!("{} computed in {:?}", model, now.elapsed());
    Outcome::Success(Box::new(volume))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Geometry, Optics},
        models::{Accuracy, DefocusPlane, Koehler, RichardsWolf},
    };

    fn small_config() -> Config {
        Config::new(Optics::default(), Geometry::new(16, 16, 5).pixel_size(50.)).workers(2)
    }

    fn large_engine() -> PsfEngine {
        let config = Config::new(Optics::default(), Geometry::new(128, 128, 33));
        PsfEngine::new(RichardsWolf::default().accuracy(Accuracy::Best), config)
    }

    #[test]
    fn run_returns_the_rescaled_volume() {
        let engine = PsfEngine::new(Koehler::new(0.5, 0.1), small_config());
        let volume = engine.run().unwrap().volume().unwrap();
        assert_eq!(volume.len(), 16 * 16 * 5);
        let stats = volume.statistics().unwrap();
        assert!(stats.maximum.value > 0.);
        let max = volume.data().iter().cloned().fold(f64::MIN, f64::max);
        assert!((max - 1.).abs() < 1e-12);
    }

    #[test]
    fn earlier_engine_cancel_does_not_stop_a_new_run() {
        let engine = PsfEngine::new(DefocusPlane::default(), small_config());
        engine.cancel();
        assert!(engine.run().unwrap().is_success());
    }

    #[test]
    fn cancelled_token_stops_run_with() {
        let engine = PsfEngine::new(DefocusPlane::default(), small_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(engine.run_with(&cancel).unwrap().is_cancelled());
    }

    #[test]
    fn invalid_settings_are_rejected_before_running() {
        let config = Config::new(Optics::default(), Geometry::new(12, 16, 5));
        let engine = PsfEngine::new(Koehler::default(), config);
        assert!(matches!(
            engine.spawn(),
            Err(ValidationError::NotPowerOfTwo { axis: "nx", n: 12 })
        ));
    }

    #[test]
    fn terminal_event_is_last_and_unique() {
        let engine = PsfEngine::new(DefocusPlane::default(), small_config());
        let events: Vec<Event> = engine.spawn().unwrap().into_events().collect();
        let (last, progress) = events.split_last().unwrap();
        assert!(matches!(last, Event::Success(_)));
        assert!(progress.iter().all(|e| !e.is_terminal()));
        let percents: Vec<f64> = progress
            .iter()
            .filter_map(|e| match e {
                Event::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents.first(), Some(&scheduler::STARTING));
        assert_eq!(percents.last(), Some(&100.));
    }

    #[test]
    fn wait_after_reading_the_progress() {
        let engine = PsfEngine::new(DefocusPlane::default(), small_config());
        let job = engine.spawn().unwrap();
        let last = job.progress().iter().last().unwrap();
        assert_eq!(last.percent, 100.);
        assert!(job.wait().is_success());
    }

    #[test]
    fn engine_cancel_reaches_the_spawned_job() {
        let engine = large_engine();
        let job = engine.spawn().unwrap();
        engine.cancel();
        assert!(job.wait().is_cancelled());
    }

    #[test]
    fn jobs_have_their_own_tokens() {
        let engine = large_engine();
        let (a, b) = (engine.spawn().unwrap(), engine.spawn().unwrap());
        a.cancel();
        assert!(!b.canceller().is_cancelled());
        b.cancel();
        assert!(a.wait().is_cancelled());
        assert!(b.wait().is_cancelled());
    }
}
