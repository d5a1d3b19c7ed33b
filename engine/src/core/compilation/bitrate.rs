//! Bitrate Signal
//!
//! Per-camera bitrate series in compilation-relative time, used as a soft
//! quality preference during camera selection.

use std::collections::BTreeMap;

use tracing::debug;

use super::resolve::SourceWindow;
use crate::core::catalog::{BitrateSample, Track};
use crate::core::{CameraIndex, TimeSec};

/// Minimum spacing between reported bitrate peaks, in seconds
pub const PEAK_MIN_DISTANCE: TimeSec = 5.0;

/// Largest weight a camera can get from its bitrate
pub const MAX_BITRATE_WEIGHT: f64 = 2.0;

/// Bitrate series per camera, keyed by compilation-relative time
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BitrateTable {
    series: BTreeMap<CameraIndex, Vec<BitrateSample>>,
}

impl BitrateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds samples for a camera, keeping its series sorted
    pub fn insert(&mut self, camera: CameraIndex, samples: impl IntoIterator<Item = BitrateSample>) {
        let series = self.series.entry(camera).or_default();
        series.extend(
            samples
                .into_iter()
                .filter(|s| s.time.is_finite() && s.bitrate.is_finite()),
        );
        // stable: a clip's start sample stays after the previous clip's end marker
        series.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Projects every clip's bitrate into the window's compilation time.
    ///
    /// Clips without a series contribute their probe bitrate from their
    /// start. Each clip's end is marked with a zero sample so gaps in the
    /// footage carry no preference.
    pub fn from_tracks(tracks: &[Track], window: &SourceWindow) -> Self {
        let mut table = Self::new();

        for track in tracks {
            let mut samples = Vec::new();
            for clip in track.clips() {
                let series: Vec<BitrateSample> = if clip.bitrate_samples().is_empty() {
                    clip.bitrate_at(0.0)
                        .map(|b| vec![BitrateSample::new(0.0, b)])
                        .unwrap_or_default()
                } else {
                    clip.bitrate_samples().to_vec()
                };
                if series.is_empty() {
                    continue;
                }

                samples.extend(series.into_iter().map(|s| {
                    BitrateSample::new(window.to_compilation(clip.start_time() + s.time), s.bitrate)
                }));
                samples.push(BitrateSample::new(window.to_compilation(clip.end_time()), 0.0));
            }

            if !samples.is_empty() {
                table.insert(track.camera_index(), samples);
            }
        }

        debug!(cameras = table.series.len(), "Built bitrate table");
        table
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }

    /// Series for one camera
    pub fn samples(&self, camera: CameraIndex) -> &[BitrateSample] {
        self.series.get(&camera).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest sample at or before `time`; `None` before the series starts
    pub fn bitrate_at(&self, camera: CameraIndex, time: TimeSec) -> Option<f64> {
        self.samples(camera)
            .iter()
            .take_while(|s| s.time <= time)
            .last()
            .map(|s| s.bitrate)
    }

    /// Selection weight per camera at `time`.
    ///
    /// `w = 1 + min(b / median - 1, 1)` for cameras above the cross-camera
    /// median, `1` otherwise, so weights stay within `[1, 2]`.
    pub fn weights(&self, cameras: &[CameraIndex], time: TimeSec) -> Vec<f64> {
        let bitrates: Vec<Option<f64>> =
            cameras.iter().map(|c| self.bitrate_at(*c, time)).collect();
        let known: Vec<f64> = bitrates.iter().flatten().copied().collect();

        let Some(median) = median(&known).filter(|m| *m > 0.0) else {
            return vec![1.0; cameras.len()];
        };

        bitrates
            .into_iter()
            .map(|b| match b {
                Some(b) if b > median => (1.0 + (b / median - 1.0).min(1.0)).min(MAX_BITRATE_WEIGHT),
                _ => 1.0,
            })
            .collect()
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Picks the timestamps of the `count` highest bitrates, at least
/// `min_distance` seconds apart, sorted by time
pub fn find_bitrate_peaks(
    samples: &[BitrateSample],
    count: usize,
    min_distance: TimeSec,
) -> Vec<TimeSec> {
    let mut by_bitrate: Vec<&BitrateSample> = samples
        .iter()
        .filter(|s| s.time.is_finite() && s.bitrate.is_finite())
        .collect();
    by_bitrate.sort_by(|a, b| b.bitrate.total_cmp(&a.bitrate));

    let mut peaks: Vec<TimeSec> = Vec::with_capacity(count);
    for sample in by_bitrate {
        if peaks.len() >= count {
            break;
        }
        if peaks.iter().all(|p| (p - sample.time).abs() >= min_distance) {
            peaks.push(sample.time);
        }
    }

    peaks.sort_by(f64::total_cmp);
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{build_tracks, MediaClip, ProbeInfo};
    use crate::core::TimeRange;

    fn samples(points: &[(f64, f64)]) -> Vec<BitrateSample> {
        points.iter().map(|(t, b)| BitrateSample::new(*t, *b)).collect()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_bitrate_at_steps() {
        let mut table = BitrateTable::new();
        table.insert(1, samples(&[(5.0, 200.0), (0.0, 100.0)]));

        assert_eq!(table.bitrate_at(1, -1.0), None);
        assert_eq!(table.bitrate_at(1, 0.0), Some(100.0));
        assert_eq!(table.bitrate_at(1, 4.9), Some(100.0));
        assert_eq!(table.bitrate_at(1, 7.0), Some(200.0));
        assert_eq!(table.bitrate_at(2, 7.0), None);
    }

    #[test]
    fn test_weights_favor_above_median() {
        let mut table = BitrateTable::new();
        table.insert(1, samples(&[(0.0, 100.0)]));
        table.insert(2, samples(&[(0.0, 150.0)]));
        table.insert(3, samples(&[(0.0, 1000.0)]));

        let weights = table.weights(&[1, 2, 3], 1.0);

        assert_eq!(weights[0], 1.0);
        assert_eq!(weights[1], 1.0);
        // capped at twice the base weight
        assert_eq!(weights[2], 2.0);
    }

    #[test]
    fn test_weights_partial_boost() {
        let mut table = BitrateTable::new();
        table.insert(1, samples(&[(0.0, 100.0)]));
        table.insert(2, samples(&[(0.0, 150.0)]));

        // median 125: camera 2 gets 1 + (150/125 - 1)
        let weights = table.weights(&[1, 2], 0.0);
        assert_eq!(weights[0], 1.0);
        assert!((weights[1] - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_weights_without_data_are_uniform() {
        let table = BitrateTable::new();
        assert_eq!(table.weights(&[1, 2], 0.0), vec![1.0, 1.0]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_from_tracks_projects_into_window() {
        let a = MediaClip::new("a", "/a.mp4", 100.0, 10.0, 1)
            .unwrap()
            .with_bitrate_samples(samples(&[(0.0, 500.0), (4.0, 900.0)]));
        let b = MediaClip::new("b", "/b.mp4", 100.0, 20.0, 2)
            .unwrap()
            .with_probe(ProbeInfo {
                bitrate: Some(700),
                ..Default::default()
            });
        let tracks = build_tracks(&[a, b]).unwrap();
        let window = SourceWindow::new(TimeRange::new(100.0, 120.0), 20.0);

        let table = BitrateTable::from_tracks(&tracks, &window);

        assert_eq!(table.bitrate_at(1, 2.0), Some(500.0));
        assert_eq!(table.bitrate_at(1, 5.0), Some(900.0));
        // past the end of clip a
        assert_eq!(table.bitrate_at(1, 12.0), Some(0.0));
        assert_eq!(table.bitrate_at(2, 12.0), Some(700.0));
    }

    #[test]
    fn test_find_bitrate_peaks_respects_distance() {
        let series = samples(&[
            (0.0, 10.0),
            (1.0, 90.0),
            (2.0, 80.0),
            (8.0, 70.0),
            (20.0, 60.0),
            (21.0, 95.0),
        ]);

        let peaks = find_bitrate_peaks(&series, 3, PEAK_MIN_DISTANCE);
        assert_eq!(peaks, vec![1.0, 8.0, 21.0]);

        assert!(find_bitrate_peaks(&series, 0, PEAK_MIN_DISTANCE).is_empty());
        assert!(find_bitrate_peaks(&[], 3, PEAK_MIN_DISTANCE).is_empty());
    }
}
