use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use psf_generator::{
    Accuracy, BornWolf, Config, Event, Geometry, Optics, Outcome, PsfEngine, Scale,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::new(
        Optics::new(1.4, 610.),
        Geometry::new(128, 128, 65).pixel_size(50.).z_step(100.),
    )
    .scale(Scale::Linear);
    let engine = PsfEngine::new(BornWolf::new(1.5).accuracy(Accuracy::Good), config);
    let job = engine.spawn()?;

    let pb = ProgressBar::new(100);
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos:>3}% {msg}",
    )?);
    let mut outcome = None;
    for event in job.into_events() {
        match event {
            Event::Progress { percent, message } => {
                pb.set_position(percent as u64);
                pb.set_message(message);
            }
            terminal => outcome = terminal.into_outcome(),
        }
    }
    pb.finish();

    match outcome {
        Some(Outcome::Success(volume)) => {
            let summary = volume.summary().context("the volume was not analyzed")?;
            println!("{}", engine.model());
            println!("{summary}");
            for stats in volume.plane_statistics().iter().step_by(8) {
                println!(
                    "z={:>3} max={:.3e} energy={:.3e} radius={:.2}px",
                    stats.z, stats.relative_maximum, stats.relative_energy, stats.efficiency_radius
                );
            }
            Ok(())
        }
        Some(Outcome::Failure(e)) => Err(e.into()),
        Some(Outcome::Cancelled) | None => bail!("the PSF computation was cancelled"),
    }
}
