//! Windowed FFT with analyser-style smoothing and byte quantisation

use super::AnalyserConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Spectrum analysis behind the analyser node.
///
/// Mirrors the Web Audio analyser: Blackman window, magnitudes scaled by
/// `1/N`, exponential smoothing against the previous block, conversion to
/// decibels and a linear map of `[min_decibels, max_decibels]` onto `0..=255`.
pub struct SpectrumAnalyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,

    // Smoothed magnitudes, one per bin
    smoothed: Vec<f32>,

    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyser {
    pub fn new(config: &AnalyserConfig) -> Self {
        let fft_size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        // Blackman window (alpha = 0.16)
        let n = fft_size as f32;
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        Self {
            fft_size,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Run one analysis block over the newest `fft_size` samples.
    ///
    /// Short input is zero-padded at the front so the newest sample always
    /// lands at the end of the window.
    pub fn analyse(&mut self, samples: &[f32]) {
        let used = samples.len().min(self.fft_size);
        let pad = self.fft_size - used;
        let recent = &samples[samples.len() - used..];

        for slot in &mut self.buffer[..pad] {
            *slot = Complex::new(0.0, 0.0);
        }
        for (i, &sample) in recent.iter().enumerate() {
            let idx = pad + i;
            self.buffer[idx] = Complex::new(sample * self.window[idx], 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.buffer.iter()) {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            // Non-finite input would poison every later block
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
    }

    /// Smoothed linear magnitudes from the last block
    pub fn magnitudes(&self) -> &[f32] {
        &self.smoothed
    }

    /// Write smoothed magnitudes quantised to bytes
    pub fn write_bytes(&self, out: &mut [u8]) {
        let range = self.max_decibels - self.min_decibels;
        for (slot, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * magnitude.log10();
            let scaled = (255.0 / range) * (db - self.min_decibels);
            *slot = scaled.floor().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Quantise one time-domain sample to an unsigned byte centred at 128
pub fn time_domain_byte(sample: f32) -> u8 {
    (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8
}
