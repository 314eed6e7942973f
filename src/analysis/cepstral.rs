//! # Cepstral and Chroma Features
//!
//! Both work on the same magnitude spectrum as [`crate::analysis::spectral`]
//! (first `m` FFT bins divided by `m`), so they add no FFT of their own.
//!
//! ## MFCC:
//! 40 triangular filters: 13 linearly spaced from 133.33 Hz in 66.67 Hz
//! steps, then 27 log-spaced ones, each step a factor of 1.0711703. Each
//! filter has unit area. The log10 filter energies go through an orthonormal
//! DCT-II and the first 13 coefficients are kept.
//!
//! ## Chroma:
//! Bin `k` is treated as frequency `(k + 1) · fs / (2m)` and mapped to the
//! nearest semitone above A0 (27.5 Hz). Energy is averaged over the bins of
//! each semitone, folded into 12 pitch classes starting at A and divided by
//! the frame's total spectral energy.

use crate::analysis::spectral::EPS;
use std::collections::BTreeMap;
use std::f64::consts::PI;

pub const MFCC_COUNT: usize = 13;
pub const CHROMA_BINS: usize = 12;

const LINEAR_FILTERS: usize = 13;
const LOG_FILTERS: usize = 27;
const LOWEST_EDGE_HZ: f64 = 133.33;
const LINEAR_STEP_HZ: f64 = 200.0 / 3.0;
const LOG_STEP: f64 = 1.071_170_3;
const A0_HZ: f64 = 27.5;

/// Mel-style filterbank plus the DCT matrix, built once per frame geometry.
#[derive(Debug, Clone)]
pub struct MfccBank {
    bins: usize,
    /// `[filter][bin]`
    filters: Vec<Vec<f64>>,
    /// `[coefficient][filter]`
    dct: Vec<Vec<f64>>,
}

impl MfccBank {
    pub fn new(sample_rate: u32, bins: usize) -> Self {
        let fs = sample_rate as f64;

        let mut edges: Vec<f64> = (0..LINEAR_FILTERS)
            .map(|i| LOWEST_EDGE_HZ + i as f64 * LINEAR_STEP_HZ)
            .collect();
        let last_linear = edges[LINEAR_FILTERS - 1];
        edges.extend((1..=LOG_FILTERS + 2).map(|i| last_linear * LOG_STEP.powi(i as i32)));

        let bin_hz = |k: usize| k as f64 * fs / bins.max(1) as f64;
        // First bin strictly above `hz`, capped at the spectrum length
        let bin_after = |hz: f64| (((hz * bins as f64 / fs).floor() as usize) + 1).min(bins);

        let filters = edges
            .windows(3)
            .map(|edge| {
                let (low, centre, high) = (edge[0], edge[1], edge[2]);
                let height = 2.0 / (high - low);
                let mut filter = vec![0.0; bins];

                for (k, weight) in filter.iter_mut().enumerate().take(bin_after(centre)).skip(bin_after(low)) {
                    *weight = height * (bin_hz(k) - low) / (centre - low);
                }
                for (k, weight) in filter.iter_mut().enumerate().take(bin_after(high)).skip(bin_after(centre)) {
                    *weight = height * (high - bin_hz(k)) / (high - centre);
                }
                filter
            })
            .collect();

        Self {
            bins,
            filters,
            dct: dct_matrix(MFCC_COUNT, LINEAR_FILTERS + LOG_FILTERS),
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// The first [`MFCC_COUNT`] cepstral coefficients of one spectrum.
    pub fn mfcc(&self, spectrum: &[f64]) -> Vec<f64> {
        let log_energies: Vec<f64> = self
            .filters
            .iter()
            .map(|filter| {
                let energy: f64 = filter.iter().zip(spectrum).map(|(w, x)| w * x).sum();
                (energy + EPS).log10()
            })
            .collect();

        self.dct
            .iter()
            .map(|basis| basis.iter().zip(&log_energies).map(|(c, e)| c * e).sum())
            .collect()
    }
}

/// Orthonormal DCT-II rows: `s_k · cos(π k (n + 0.5) / N)`.
fn dct_matrix(coefficients: usize, inputs: usize) -> Vec<Vec<f64>> {
    let n = inputs as f64;
    (0..coefficients)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..inputs)
                .map(|i| scale * (PI * k as f64 * (i as f64 + 0.5) / n).cos())
                .collect()
        })
        .collect()
}

/// Semitone index of every spectrum bin and how many bins share it.
#[derive(Debug, Clone)]
pub struct ChromaMap {
    pitches: Vec<i64>,
    bins_per_pitch: BTreeMap<i64, usize>,
}

impl ChromaMap {
    pub fn new(sample_rate: u32, bins: usize) -> Self {
        let fs = sample_rate as f64;
        let pitches: Vec<i64> = (0..bins)
            .map(|k| {
                let hz = (k + 1) as f64 * fs / (2.0 * bins as f64);
                (12.0 * (hz / A0_HZ).log2()).round() as i64
            })
            .collect();

        let mut bins_per_pitch = BTreeMap::new();
        for &pitch in &pitches {
            *bins_per_pitch.entry(pitch).or_insert(0) += 1;
        }

        Self {
            pitches,
            bins_per_pitch,
        }
    }

    /// The 12 pitch-class energies (A, A#, ..., G#) and their standard deviation.
    pub fn chroma(&self, spectrum: &[f64]) -> ([f64; CHROMA_BINS], f64) {
        let mut classes = [0.0; CHROMA_BINS];
        let mut total = 0.0;

        for (&pitch, x) in self.pitches.iter().zip(spectrum) {
            let energy = x * x;
            total += energy;
            let shared = self.bins_per_pitch.get(&pitch).copied().unwrap_or(1) as f64;
            classes[pitch.rem_euclid(CHROMA_BINS as i64) as usize] += energy / shared;
        }

        let norm = if total == 0.0 { EPS } else { total };
        for value in classes.iter_mut() {
            *value /= norm;
        }

        let mean = classes.iter().sum::<f64>() / CHROMA_BINS as f64;
        let variance = classes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / CHROMA_BINS as f64;
        (classes, variance.sqrt())
    }
}
