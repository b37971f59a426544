//! busmix - speaker bus router
//!
//! Starts a session, maps a stereo bus onto the default sink and plays a
//! short test tone through it.

use std::time::{Duration, Instant};

use busmix::backend::{self, NullBackend};
use busmix::config::Settings;
use busmix::mapping::{SpeakerBus, Target};
use busmix::{RouteError, Session};

const TONE_HZ: f64 = 440.0;
const TONE_SECONDS: u64 = 3;
/// -12 dBFS
const TONE_AMPLITUDE: f64 = 8192.0;

fn main() -> Result<(), RouteError> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting busmix");

    let settings = Settings::load();
    let backend = backend::by_name(&settings.backend, settings.period_frames).unwrap_or_else(|| {
        log::warn!("Unknown audio backend {:?}, using null", settings.backend);
        Box::new(NullBackend::new(settings.period_frames))
    });
    let mut session = Session::start(backend, settings.clone())?;

    let bus = session.add_bus("speaker", SpeakerBus::front());
    match session.load_mappings() {
        Ok(restored) if restored > 0 => {}
        Ok(_) => {
            if let Err(e) = session.add_full(bus, Target::Default) {
                log::warn!("Could not map the speaker bus: {}", e);
            }
        }
        Err(e) => log::warn!("Could not load saved mappings: {}", e),
    }

    let period_frames = settings.period_frames.max(1) as usize;
    let period = Duration::from_secs_f64(period_frames as f64 / settings.sample_rate.max(1) as f64);
    let step = TONE_HZ * std::f64::consts::TAU / settings.sample_rate.max(1) as f64;
    let mut phase = 0.0f64;
    let mut chunk = vec![0i16; period_frames * 2];

    let end = Instant::now() + Duration::from_secs(TONE_SECONDS);
    let mut next = Instant::now();
    while Instant::now() < end {
        session.process_events();
        for frame in chunk.chunks_exact_mut(2) {
            let sample = (phase.sin() * TONE_AMPLITUDE) as i16;
            frame[0] = sample;
            frame[1] = sample;
            phase = (phase + step) % std::f64::consts::TAU;
        }
        session.enqueue(bus, &chunk);

        next += period;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    for (key, series, summary) in session.take_peaks() {
        log::info!(
            "{}: peak {:.3} over {} buckets, {:.1}% clipped",
            key,
            summary.max,
            series.len(),
            summary.clipped_percent()
        );
    }

    if session.model().dirty
        && let Err(e) = session.save_mappings()
    {
        log::warn!("Could not save mappings: {}", e);
    }
    session.shutdown();
    Ok(())
}
