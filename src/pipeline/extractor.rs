//! Per-frame feature extraction and band reduction

use super::graph::AnalysisGraph;
use crate::state::LifecycleState;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Band cutoffs as fractions of the bin count.
///
/// Fractions rather than Hz, so the perceptual split is only accurate near a
/// 48 kHz sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandSplit {
    pub bass_end: f32,
    pub mid_end: f32,
    pub treble_end: f32,
}

impl Default for BandSplit {
    fn default() -> Self {
        Self {
            bass_end: 0.01,
            mid_end: 0.08,
            treble_end: 0.80,
        }
    }
}

impl BandSplit {
    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 < self.bass_end
            && self.bass_end < self.mid_end
            && self.mid_end < self.treble_end
            && self.treble_end <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(format!(
                "band cutoffs must satisfy 0 < bass_end < mid_end < treble_end <= 1, got {} / {} / {}",
                self.bass_end, self.mid_end, self.treble_end
            ))
        }
    }

    /// Bin ranges for a spectrum of `bins` entries
    pub fn ranges(&self, bins: usize) -> BandRanges {
        let cut = |fraction: f32| ((fraction * bins as f32).floor() as usize).min(bins);
        let bass_end = cut(self.bass_end);
        let mid_end = cut(self.mid_end).max(bass_end);
        let treble_end = cut(self.treble_end).max(mid_end);

        BandRanges {
            bass: 0..bass_end,
            mid: bass_end..mid_end,
            treble: mid_end..treble_end,
        }
    }
}

/// Contiguous bin ranges for each band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandRanges {
    pub bass: Range<usize>,
    pub mid: Range<usize>,
    pub treble: Range<usize>,
}

/// Low / mid / high energy, each in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl Bands {
    /// Apply a consumer intensity multiplier
    pub fn scaled(&self, intensity: f32) -> Bands {
        Bands {
            bass: self.bass * intensity,
            mid: self.mid * intensity,
            treble: self.treble * intensity,
        }
    }
}

/// Band values plus the mean of the whole spectrum
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandLevels {
    pub bands: Bands,
    pub overall: f32,
}

fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / bins.len() as f32 / 255.0
}

/// Reduce a byte spectrum to band levels
pub fn compute_bands(spectrum: &[u8], split: &BandSplit) -> BandLevels {
    let ranges = split.ranges(spectrum.len());
    BandLevels {
        bands: Bands {
            bass: mean_level(&spectrum[ranges.bass]),
            mid: mean_level(&spectrum[ranges.mid]),
            treble: mean_level(&spectrum[ranges.treble]),
        },
        overall: mean_level(spectrum),
    }
}

/// One frame of derived audio features
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSnapshot {
    /// Time-domain bytes centred at 128
    pub waveform: Vec<u8>,

    /// Smoothed spectrum bytes
    pub spectrum: Vec<u8>,

    pub bands: Bands,
    pub overall: f32,

    /// Sequence number within the current session
    pub frame: u64,
}

/// Whether the frame loop should schedule another tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Turns analyser state into snapshots, one tick per frame
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    split: BandSplit,
    frames: u64,
}

impl FeatureExtractor {
    pub fn new(split: BandSplit) -> Self {
        Self { split, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Produce this frame's snapshot.
    ///
    /// Returns `Stop` without touching the graph once the pipeline is no
    /// longer listening or the graph has been torn down.
    pub fn tick(
        &mut self,
        graph: &mut AnalysisGraph,
        state: LifecycleState,
    ) -> (Option<SpectralSnapshot>, LoopControl) {
        if !state.is_listening() {
            return (None, LoopControl::Stop);
        }
        match self.extract(graph) {
            Some(snapshot) => (Some(snapshot), LoopControl::Continue),
            None => (None, LoopControl::Stop),
        }
    }

    /// Read waveform and spectrum from one render quantum and reduce them
    pub fn extract(&mut self, graph: &mut AnalysisGraph) -> Option<SpectralSnapshot> {
        let (waveform, spectrum) = graph.capture()?;
        let levels = compute_bands(spectrum, &self.split);
        self.frames += 1;

        Some(SpectralSnapshot {
            waveform: waveform.to_vec(),
            spectrum: spectrum.to_vec(),
            bands: levels.bands,
            overall: levels.overall,
            frame: self.frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn first_ten_bins_are_pure_bass() {
        let mut spectrum = vec![0u8; 1024];
        spectrum[..10].iter_mut().for_each(|b| *b = 255);

        let levels = compute_bands(&spectrum, &BandSplit::default());

        assert_approx(levels.bands.bass, 1.0, 1e-6);
        assert_approx(levels.bands.mid, 0.0, 1e-6);
        assert_approx(levels.bands.treble, 0.0, 1e-6);
        assert_approx(levels.overall, 10.0 / 1024.0, 1e-4);
    }

    #[test]
    fn default_ranges_for_1024_bins() {
        let ranges = BandSplit::default().ranges(1024);

        assert_eq!(ranges.bass, 0..10);
        assert_eq!(ranges.mid, 10..81);
        assert_eq!(ranges.treble, 81..819);
    }

    #[test]
    fn ranges_are_contiguous_and_increasing() {
        let split = BandSplit::default();
        for bins in [128, 256, 512, 1024, 2048, 4096, 16384] {
            let ranges = split.ranges(bins);

            assert_eq!(ranges.bass.start, 0);
            assert_eq!(ranges.bass.end, ranges.mid.start);
            assert_eq!(ranges.mid.end, ranges.treble.start);
            assert!(ranges.bass.start < ranges.bass.end, "bass empty at {bins}");
            assert!(ranges.mid.start < ranges.mid.end, "mid empty at {bins}");
            assert!(ranges.treble.start < ranges.treble.end, "treble empty at {bins}");
            assert!(ranges.treble.end as f32 <= 0.80 * bins as f32);
        }
    }

    #[test]
    fn bins_above_treble_only_move_overall() {
        let split = BandSplit::default();
        let mut spectrum: Vec<u8> = (0..1024).map(|i| (i % 200) as u8).collect();
        let before = compute_bands(&spectrum, &split);

        spectrum[819..].iter_mut().for_each(|b| *b = 255);
        let after = compute_bands(&spectrum, &split);

        assert_eq!(before.bands, after.bands);
        assert!(after.overall > before.overall);
    }

    #[test]
    fn levels_stay_in_unit_range() {
        let split = BandSplit::default();
        let patterns: Vec<Vec<u8>> = vec![
            vec![0; 1024],
            vec![255; 1024],
            (0..1024).map(|i| (i % 256) as u8).collect(),
            (0..1024).map(|i| (255 - (i * 7) % 256) as u8).collect(),
            (0..1024).map(|i| if i % 2 == 0 { 255 } else { 0 }).collect(),
        ];

        for spectrum in &patterns {
            let levels = compute_bands(spectrum, &split);
            for value in [
                levels.bands.bass,
                levels.bands.mid,
                levels.bands.treble,
                levels.overall,
            ] {
                assert!((0.0..=1.0).contains(&value), "out of range: {value}");
            }
        }

        let full = compute_bands(&patterns[1], &split);
        assert_approx(full.bands.bass, 1.0, 1e-6);
        assert_approx(full.overall, 1.0, 1e-6);
    }

    #[test]
    fn tiny_spectra_yield_zero_for_empty_bands() {
        let levels = compute_bands(&[255; 8], &BandSplit::default());

        assert_eq!(levels.bands.bass, 0.0);
        assert_eq!(levels.bands.mid, 0.0);
        assert_approx(levels.bands.treble, 1.0, 1e-6);
        assert_approx(levels.overall, 1.0, 1e-6);

        assert_eq!(compute_bands(&[], &BandSplit::default()), BandLevels::default());
    }

    #[test]
    fn split_validation_requires_increasing_cutoffs() {
        assert!(BandSplit::default().validate().is_ok());
        assert!(BandSplit {
            bass_end: 0.1,
            mid_end: 0.05,
            treble_end: 0.8
        }
        .validate()
        .is_err());
        assert!(BandSplit {
            bass_end: 0.01,
            mid_end: 0.08,
            treble_end: 1.2
        }
        .validate()
        .is_err());
    }

    #[test]
    fn scaled_bands_apply_intensity() {
        let bands = Bands {
            bass: 0.5,
            mid: 0.25,
            treble: 0.1,
        };
        let scaled = bands.scaled(2.0);

        assert_approx(scaled.bass, 1.0, 1e-6);
        assert_approx(scaled.mid, 0.5, 1e-6);
        assert_approx(scaled.treble, 0.2, 1e-6);
    }
}
