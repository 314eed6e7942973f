//! # Spectral Features
//!
//! Magnitude spectrum and the spectral descriptors computed from it. No
//! window is applied before the FFT; the spectrum keeps the first `n / 2`
//! bins and divides them by that bin count.

use rustfft::{num_complex::Complex, FftPlanner};

/// Number of sub-blocks used by the entropy features.
pub const ENTROPY_BLOCKS: usize = 10;

/// Fraction of spectral energy below the roll-off point.
pub const ROLLOFF_FRACTION: f64 = 0.90;

pub(crate) const EPS: f64 = f64::EPSILON;

/// Computes magnitude spectra. Owns an FFT planner so repeated frames of the
/// same length reuse one plan.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// `|FFT(frame)|`, first `n / 2` bins, each divided by `n / 2`.
    ///
    /// Returns an empty spectrum for frames shorter than two samples.
    pub fn magnitude(&mut self, frame: &[f64]) -> Vec<f64> {
        let bins = frame.len() / 2;
        if bins == 0 {
            return Vec::new();
        }

        let mut buffer: Vec<Complex<f64>> = frame.iter().map(|&x| Complex::new(x, 0.0)).collect();
        let fft = self.planner.plan_fft_forward(frame.len());
        fft.process(&mut buffer);

        buffer[..bins].iter().map(|c| c.norm() / bins as f64).collect()
    }
}

/// Entropy of the energy distribution over [`ENTROPY_BLOCKS`] contiguous blocks.
///
/// Samples past `blocks * floor(n / blocks)` are ignored.
pub fn block_entropy(values: &[f64]) -> f64 {
    let block_len = values.len() / ENTROPY_BLOCKS;
    if block_len == 0 {
        return 0.0;
    }

    let total: f64 = values.iter().map(|x| x * x).sum();
    let entropy: f64 = values[..block_len * ENTROPY_BLOCKS]
        .chunks_exact(block_len)
        .map(|block| {
            let share = block.iter().map(|x| x * x).sum::<f64>() / (total + EPS);
            share * (share + EPS).log2()
        })
        .sum();

    -entropy
}

/// Spectral centroid and spread, both normalized by the Nyquist frequency.
pub fn centroid_and_spread(spectrum: &[f64], sample_rate: u32) -> (f64, f64) {
    if spectrum.is_empty() {
        return (0.0, 0.0);
    }

    let nyquist = sample_rate as f64 / 2.0;
    let bin_width = sample_rate as f64 / (2.0 * spectrum.len() as f64);
    let peak = spectrum.iter().cloned().fold(f64::MIN, f64::max);
    let scale = if peak == 0.0 { EPS } else { peak };

    let weights: Vec<f64> = spectrum.iter().map(|x| x / scale).collect();
    let freq = |k: usize| (k + 1) as f64 * bin_width;

    let numerator: f64 = weights.iter().enumerate().map(|(k, w)| freq(k) * w).sum();
    let denominator: f64 = weights.iter().sum::<f64>() + EPS;
    let centroid = numerator / denominator;

    let variance: f64 = weights
        .iter()
        .enumerate()
        .map(|(k, w)| (freq(k) - centroid).powi(2) * w)
        .sum::<f64>()
        / denominator;

    (centroid / nyquist, variance.sqrt() / nyquist)
}

/// Squared difference between two sum-normalized spectra.
pub fn flux(spectrum: &[f64], previous: &[f64]) -> f64 {
    if spectrum.len() != previous.len() {
        return 0.0;
    }

    let sum = spectrum.iter().map(|x| x + EPS).sum::<f64>();
    let previous_sum = previous.iter().map(|x| x + EPS).sum::<f64>();

    spectrum
        .iter()
        .zip(previous)
        .map(|(x, p)| (x / sum - p / previous_sum).powi(2))
        .sum()
}

/// Relative position of the first bin where cumulative energy exceeds
/// [`ROLLOFF_FRACTION`] of the total.
pub fn rolloff(spectrum: &[f64]) -> f64 {
    if spectrum.is_empty() {
        return 0.0;
    }

    let total: f64 = spectrum.iter().map(|x| x * x).sum();
    let threshold = ROLLOFF_FRACTION * total;

    let mut cumulative = 0.0;
    for (k, x) in spectrum.iter().enumerate() {
        cumulative += x * x;
        if cumulative + EPS > threshold {
            return k as f64 / spectrum.len() as f64;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64, sample_rate: u32, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_magnitude_of_pure_tone() {
        // 1 kHz at 16 kHz over 800 samples: exactly 50 cycles, so one bin
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.magnitude(&tone(1000.0, 16000, 800));

        assert_eq!(spectrum.len(), 400);
        let (peak_bin, _) = spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (k, &x)| if x > best.1 { (k, x) } else { best });
        assert_eq!(peak_bin, 50);
        // |FFT| of a unit sine at its bin is n/2 = 400, divided by 400 bins
        assert!((spectrum[50] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_centroid_and_rolloff_of_pure_tone() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.magnitude(&tone(1000.0, 16000, 800));

        let (centroid, spread) = centroid_and_spread(&spectrum, 16000);
        // Bin 50 is labelled (50 + 1) * 20 Hz
        assert!((centroid - 1020.0 / 8000.0).abs() < 1e-6);
        assert!(spread < 1e-3);

        assert!((rolloff(&spectrum) - 50.0 / 400.0).abs() < 1e-12);
    }

    #[test]
    fn test_silent_spectrum() {
        let spectrum = vec![0.0; 64];
        assert_eq!(centroid_and_spread(&spectrum, 8000), (0.0, 0.0));
        assert_eq!(rolloff(&spectrum), 0.0);
        assert_eq!(block_entropy(&spectrum), 0.0);
    }

    #[test]
    fn test_block_entropy_bounds() {
        // Energy spread evenly over all ten blocks → log2(10)
        let flat = vec![0.5; 100];
        assert!((block_entropy(&flat) - 10f64.log2()).abs() < 1e-9);

        // All energy in one block → 0
        let mut burst = vec![0.0; 100];
        burst[3] = 1.0;
        assert!(block_entropy(&burst).abs() < 1e-9);
    }

    #[test]
    fn test_flux_identical_spectra_is_zero() {
        let spectrum = vec![0.1, 0.4, 0.2, 0.3];
        assert!(flux(&spectrum, &spectrum).abs() < 1e-20);
        assert!(flux(&spectrum, &[0.4, 0.1, 0.3, 0.2]) > 0.0);
    }

    #[test]
    fn test_short_frame_has_empty_spectrum() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert!(analyzer.magnitude(&[0.3]).is_empty());
        assert_eq!(centroid_and_spread(&[], 8000), (0.0, 0.0));
    }
}
