use approx::assert_relative_eq;
use psf_generator::{
    Accuracy, BornWolf, CancellationToken, Config, Error, Event, Geometry, GibsonLanni, ModelError,
    ModelFamily, ModelKind, Optics, Outcome, PlaneContext, PlaneModel, PsfEngine, RadialIntensity,
    RichardsWolf, Scale, ValidationError, Volume, VolumeError,
};
use std::{
    sync::Barrier,
    thread,
    time::{Duration, Instant},
};
use strum::IntoEnumIterator;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn born_wolf_small_volume() {
    init_logger();
    let config = Config::new(Optics::new(1.4, 610.), Geometry::new(8, 8, 3));
    let engine = PsfEngine::new(BornWolf::default().accuracy(Accuracy::Good), config);
    let volume = engine.run().unwrap().volume().unwrap();
    assert_eq!(volume.planes().count(), 3);
    assert!(volume.planes().all(|plane| plane.len() == 64));
    assert!(volume.data().iter().all(|v| v.is_finite()));

    let stats = volume.statistics().unwrap();
    assert_eq!(stats.maximum.z, 1);
    assert!((stats.maximum.x as f64 - 3.5).abs() <= 1.);
    assert!((stats.maximum.y as f64 - 3.5).abs() <= 1.);
    assert!(stats.energy > 0.);
    assert_eq!(volume.plane_statistics().len(), 3);
}

#[test]
fn two_planes_are_rejected_by_every_model() {
    let config = Config::new(Optics::default(), Geometry::new(16, 16, 2));
    for kind in ModelKind::iter() {
        let engine = PsfEngine::new(kind.model(), config.clone());
        assert_eq!(
            engine.validate(),
            Err(ValidationError::TooFewPlanes { nz: 2, min: 3 }),
            "{kind}"
        );
        assert!(engine.run().is_err());
    }
}

#[test]
fn non_finite_integrand_fails_the_volume() {
    init_logger();
    let config = Config::new(Optics::new(1.4, 610.), Geometry::new(8, 8, 3)).workers(2);
    let engine = PsfEngine::new(GibsonLanni::new(1.0, 1.33), config);
    match engine.run().unwrap() {
        Outcome::Failure(Error::Plane { source, .. }) => {
            assert!(matches!(source, ModelError::Quadrature { .. }))
        }
        other => panic!("expected a plane failure, found {other:?}"),
    }
    let cancel = CancellationToken::new();
    let outcome = engine.run_with(&cancel).unwrap();
    assert!(matches!(outcome, Outcome::Failure(Error::Plane { .. })));
    assert!(!cancel.is_cancelled());
}

#[test]
fn async_events_end_with_the_volume() {
    init_logger();
    let config = Config::new(Optics::default(), Geometry::new(16, 16, 5));
    let job = PsfEngine::new(BornWolf::default(), config)
        .spawn()
        .unwrap();
    let mut events: Vec<Event> = job.into_events().collect();
    let outcome = events.pop().and_then(Event::into_outcome).unwrap();
    assert!(events.iter().all(|event| !event.is_terminal()));
    let last_percent = events
        .iter()
        .filter_map(|event| match event {
            Event::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .fold(0f64, f64::max);
    assert_eq!(last_percent, 100.);
    let mut volume = outcome.volume().unwrap();
    assert_eq!(volume.len(), 16 * 16 * 5);
    assert_eq!(
        volume.rescale(Scale::Linear),
        Err(VolumeError::AlreadyRescaled(Scale::Linear))
    );
}

#[test]
fn async_cancel_before_any_plane() {
    let config = Config::new(Optics::default(), Geometry::new(128, 128, 33));
    let engine = PsfEngine::new(RichardsWolf::default().accuracy(Accuracy::Best), config);
    let job = engine.spawn().unwrap();
    job.cancel();
    let outcome = job.wait();
    assert!(outcome.is_cancelled(), "{outcome:?}");
}

#[test]
fn sync_cancel_from_another_thread() {
    init_logger();
    let config = Config::new(Optics::default(), Geometry::new(256, 256, 65));
    let engine = PsfEngine::new(RichardsWolf::default().accuracy(Accuracy::Best), config);
    let cancel = CancellationToken::new();
    let started = Barrier::new(2);
    let (outcome, latency) = thread::scope(|s| {
        let handle = s.spawn(|| {
            started.wait();
            engine.run_with(&cancel)
        });
        started.wait();
        thread::sleep(Duration::from_millis(20));
        let cancelled_at = Instant::now();
        cancel.cancel();
        let outcome = handle.join().unwrap();
        (outcome, cancelled_at.elapsed())
    });
    let outcome = outcome.unwrap();
    assert!(outcome.is_cancelled(), "{outcome:?}");
    assert!(!outcome.is_success());
    // tasks poll the token once per radius sample or per row
    assert!(latency < Duration::from_secs(5), "returned {latency:?} after the cancel");
}

#[test]
fn radial_tables_match_direct_integration() {
    let optics = Optics::new(1.2, 610.);
    // pixel centres sit off the sampled radii, on the axes and the diagonals alike
    let geometry = Geometry::new(10, 10, 3).pixel_size(20.).z_step(100.);
    let x0 = (geometry.nx as f64 - 1.) / 2.;
    let y0 = (geometry.ny as f64 - 1.) / 2.;
    let cancel = CancellationToken::new();
    let mut plane = vec![0f64; geometry.plane_len()];
    let kinds: Vec<_> = ModelKind::iter()
        .filter(|kind| kind.family() == ModelFamily::Diffraction)
        .collect();
    assert_eq!(kinds.len(), 5);
    for kind in kinds {
        let model = kind.model();
        let radial = model.radial_intensity().unwrap();
        for z in 0..geometry.nz {
            let ctx = PlaneContext {
                z,
                optics: &optics,
                geometry: &geometry,
                cancel: &cancel,
            };
            model.compute_plane(&ctx, &mut plane).unwrap();
            let direct: Vec<f64> = (0..geometry.plane_len())
                .map(|k| {
                    let dx = (k % geometry.nx) as f64 - x0;
                    let dy = (k / geometry.nx) as f64 - y0;
                    let radius = dx.hypot(dy) * geometry.lateral_pitch();
                    radial.intensity(&optics, &geometry, z, radius).unwrap()
                })
                .collect();
            // linear interpolation between samples h pixels apart is off by at
            // most h²/8 max|I''|, about 0.4% of the plane maximum with 20nm pixels
            let tolerance = 0.02 * direct.iter().cloned().fold(0f64, f64::max);
            assert!(tolerance > 0., "{kind} z={z}");
            for (k, (table, direct)) in plane.iter().zip(&direct).enumerate() {
                assert!(
                    (table - direct).abs() <= tolerance,
                    "{kind} z={z} pixel {k}: table {table:e}, direct {direct:e}"
                );
            }
        }
    }
}

#[test]
fn higher_accuracy_stays_close() {
    let optics = Optics::new(1.4, 610.);
    let geometry = Geometry::new(16, 16, 5);
    let intensity = |accuracy: Accuracy, radius: f64| {
        BornWolf::default()
            .accuracy(accuracy)
            .intensity(&optics, &geometry, 0, radius)
            .unwrap()
    };
    for radius in [0., 100e-9, 250e-9] {
        let best = intensity(Accuracy::Best, radius);
        for accuracy in Accuracy::iter() {
            assert_relative_eq!(intensity(accuracy, radius), best, max_relative = 0.1);
        }
    }
}

#[test]
fn uniform_volume_statistics() {
    let geometry = Geometry::new(4, 3, 2);
    let mut volume = Volume::from_data(Optics::default(), geometry, vec![2.; 24]).unwrap();
    let stats = volume.analyze(Default::default()).clone();
    assert_eq!(stats.maximum.value, 2.);
    assert_eq!(
        (stats.maximum.x, stats.maximum.y, stats.maximum.z),
        (0, 0, 0)
    );
    assert_relative_eq!(stats.energy, 4. * 24., max_relative = 1e-12);
}

#[test]
fn linear_rescale_round_trip() {
    let geometry = Geometry::new(5, 4, 3);
    let data: Vec<f64> = (0..geometry.len())
        .map(|i| ((i * 7) % 11) as f64 * 0.25 + 0.1)
        .collect();
    let mut volume = Volume::from_data(Optics::default(), geometry, data.clone()).unwrap();
    let maximum = volume.analyze(Default::default()).maximum.value;
    volume.rescale(Scale::Linear).unwrap();
    for (a, b) in volume.data().iter().zip(&data) {
        assert_relative_eq!(a * maximum, *b, max_relative = 1e-12);
    }
}
