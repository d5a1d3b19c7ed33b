//! Scene Durations
//!
//! Draws scene lengths that tile the target duration.

use rand::Rng;

use super::settings::CompilationSettings;
use crate::core::{TimeSec, TIME_EPSILON};

/// Standard deviation of a drawn duration, relative to the mean
const STD_DEV_RATIO: f64 = 0.5;
/// Drawn durations are kept within [mean / SPREAD, mean * SPREAD]
const SPREAD: f64 = 3.0;

/// Samples a normal distribution with the Box-Muller transform
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    // gen() yields [0, 1); shift to (0, 1] so ln() stays finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z * std_dev
}

fn draw_duration<R: Rng + ?Sized>(rng: &mut R, settings: &CompilationSettings) -> TimeSec {
    let avg = settings.average_scene_duration;
    gaussian(rng, avg, avg * STD_DEV_RATIO)
        .clamp(avg / SPREAD, avg * SPREAD)
        .clamp(settings.min_segment_length, settings.max_segment_length)
}

/// Produces scene lengths summing to the target duration.
///
/// Expects normalized settings with a positive target. Every length lies
/// within [min, max] unless the pacing cannot tile the target, in which case
/// the final stretch is split in half.
pub fn scene_durations<R: Rng + ?Sized>(
    settings: &CompilationSettings,
    rng: &mut R,
) -> Vec<TimeSec> {
    let target = settings.target_duration;
    let min = settings.min_segment_length;
    let max = settings.max_segment_length;

    let mut durations: Vec<TimeSec> = Vec::new();
    let mut elapsed = 0.0;

    loop {
        let remaining = target - elapsed;
        if remaining <= TIME_EPSILON {
            break;
        }

        if remaining <= max {
            if remaining >= min - TIME_EPSILON || durations.is_empty() {
                durations.push(remaining);
            } else if let Some(last) = durations.last_mut() {
                *last += remaining;
            }
            break;
        }

        let mut duration = draw_duration(rng, settings);
        if remaining - duration < min {
            let shortened = remaining - min;
            if shortened >= min {
                duration = shortened;
            } else {
                let half = remaining / 2.0;
                durations.push(half);
                durations.push(remaining - half);
                break;
            }
        }

        durations.push(duration);
        elapsed += duration;
    }

    durations
}
