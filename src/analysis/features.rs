//! # Short-Term Feature Extraction
//!
//! Computes one [`FeatureVector`] per analysis frame and collects them into a
//! [`FeatureMatrix`] (row = frame, column = feature).
//!
//! ## Columns (in order):
//! | # | name | meaning |
//! |---|------|---------|
//! | 0 | `zcr` | fraction of adjacent sample pairs whose sign changes |
//! | 1 | `energy` | mean squared amplitude |
//! | 2 | `energy_entropy` | entropy of energy over 10 sub-blocks |
//! | 3 | `spectral_centroid` | center of mass of the spectrum / Nyquist |
//! | 4 | `spectral_spread` | spread around the centroid / Nyquist |
//! | 5 | `spectral_entropy` | entropy of spectral energy over 10 sub-bands |
//! | 6 | `spectral_flux` | change from the previous frame's spectrum |
//! | 7 | `spectral_rolloff` | bin below which 90% of spectral energy lies |
//! | 8-20 | `mfcc_1` .. `mfcc_13` | mel-frequency cepstral coefficients |
//! | 21-32 | `chroma_1` .. `chroma_12` | pitch-class energy, A through G# |
//! | 33 | `chroma_std` | standard deviation of the 12 chroma values |
//!
//! ## Feature sets:
//! - **basic**: columns 0-1, which are all the emotion rule needs
//! - **full** (default): columns 0-7
//! - **extended**: columns 0-33
//! - **extended_deltas**: columns 0-33 followed by `delta_<name>` for each,
//!   the frame-to-frame difference (zero on the first frame)

use crate::analysis::cepstral::{ChromaMap, MfccBank, CHROMA_BINS, MFCC_COUNT};
use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::framer::Frame;
use crate::analysis::spectral::{self, SpectrumAnalyzer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::trace;

/// A named per-frame feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Zcr,
    Energy,
    EnergyEntropy,
    SpectralCentroid,
    SpectralSpread,
    SpectralEntropy,
    SpectralFlux,
    SpectralRolloff,
    /// 1-based cepstral coefficient
    Mfcc(u8),
    /// 1-based pitch class, 1 = A
    Chroma(u8),
    ChromaStd,
}

impl FeatureKind {
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Zcr => f.write_str("zcr"),
            FeatureKind::Energy => f.write_str("energy"),
            FeatureKind::EnergyEntropy => f.write_str("energy_entropy"),
            FeatureKind::SpectralCentroid => f.write_str("spectral_centroid"),
            FeatureKind::SpectralSpread => f.write_str("spectral_spread"),
            FeatureKind::SpectralEntropy => f.write_str("spectral_entropy"),
            FeatureKind::SpectralFlux => f.write_str("spectral_flux"),
            FeatureKind::SpectralRolloff => f.write_str("spectral_rolloff"),
            FeatureKind::Mfcc(n) => write!(f, "mfcc_{}", n),
            FeatureKind::Chroma(n) => write!(f, "chroma_{}", n),
            FeatureKind::ChromaStd => f.write_str("chroma_std"),
        }
    }
}

/// One column of the feature matrix: a feature, or its frame-to-frame delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureColumn {
    pub kind: FeatureKind,
    pub delta: bool,
}

impl FeatureColumn {
    pub fn delta_of(kind: FeatureKind) -> Self {
        Self { kind, delta: true }
    }

    pub fn name(&self) -> String {
        if self.delta {
            format!("delta_{}", self.kind)
        } else {
            self.kind.name()
        }
    }
}

impl From<FeatureKind> for FeatureColumn {
    fn from(kind: FeatureKind) -> Self {
        Self { kind, delta: false }
    }
}

impl Serialize for FeatureColumn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// Which columns to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// Zero-crossing rate and energy only
    Basic,
    /// Time-domain plus spectral features
    #[default]
    Full,
    /// `Full` plus MFCC and chroma
    Extended,
    /// `Extended` plus a delta column for each of its features
    ExtendedDeltas,
}

impl FeatureSet {
    fn spectral(&self) -> bool {
        !matches!(self, FeatureSet::Basic)
    }

    fn cepstral(&self) -> bool {
        matches!(self, FeatureSet::Extended | FeatureSet::ExtendedDeltas)
    }

    fn deltas(&self) -> bool {
        matches!(self, FeatureSet::ExtendedDeltas)
    }

    pub fn columns(&self) -> Vec<FeatureColumn> {
        let mut kinds = vec![FeatureKind::Zcr, FeatureKind::Energy];
        if self.spectral() {
            kinds.extend([
                FeatureKind::EnergyEntropy,
                FeatureKind::SpectralCentroid,
                FeatureKind::SpectralSpread,
                FeatureKind::SpectralEntropy,
                FeatureKind::SpectralFlux,
                FeatureKind::SpectralRolloff,
            ]);
        }
        if self.cepstral() {
            kinds.extend((1..=MFCC_COUNT as u8).map(FeatureKind::Mfcc));
            kinds.extend((1..=CHROMA_BINS as u8).map(FeatureKind::Chroma));
            kinds.push(FeatureKind::ChromaStd);
        }

        let mut columns: Vec<FeatureColumn> = kinds.iter().map(|&kind| kind.into()).collect();
        if self.deltas() {
            columns.extend(kinds.into_iter().map(FeatureColumn::delta_of));
        }
        columns
    }
}

impl std::str::FromStr for FeatureSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(FeatureSet::Basic),
            "full" => Ok(FeatureSet::Full),
            "extended" => Ok(FeatureSet::Extended),
            "extended_deltas" => Ok(FeatureSet::ExtendedDeltas),
            other => Err(format!(
                "unknown feature set '{}', expected 'basic', 'full', 'extended' or 'extended_deltas'",
                other
            )),
        }
    }
}

/// Feature values of one frame, in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Per-frame feature table for one recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatrix {
    columns: Vec<FeatureColumn>,
    rows: Vec<FeatureVector>,
}

impl FeatureMatrix {
    pub fn new<C: Into<FeatureColumn>>(columns: impl IntoIterator<Item = C>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a matrix from literal rows; each row must match `columns` in length.
    pub fn from_rows<C: Into<FeatureColumn>>(columns: impl IntoIterator<Item = C>, rows: Vec<Vec<f64>>) -> Self {
        let mut matrix = Self::new(columns);
        debug_assert!(rows.iter().all(|row| row.len() == matrix.columns.len()));
        matrix.rows = rows.into_iter().map(FeatureVector).collect();
        matrix
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(FeatureColumn::name).collect()
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the plain (non-delta) column for `kind`.
    pub fn column_index(&self, kind: FeatureKind) -> Option<usize> {
        self.columns.iter().position(|&c| c == FeatureColumn::from(kind))
    }

    /// Iterate over one column; `None` if the matrix does not carry it.
    pub fn column(&self, kind: FeatureKind) -> Option<impl Iterator<Item = f64> + '_> {
        let index = self.column_index(kind)?;
        Some(self.rows.iter().map(move |row| row.0[index]))
    }

    /// Arithmetic mean of a column across all frames.
    ///
    /// `None` when the column is missing or there are no rows.
    pub fn column_mean(&self, kind: FeatureKind) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let sum: f64 = self.column(kind)?.sum();
        Some(sum / self.rows.len() as f64)
    }

    /// Rows as plain nested vectors, the shape used in JSON responses.
    pub fn to_nested(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|row| row.0.clone()).collect()
    }

    fn push(&mut self, row: FeatureVector) {
        self.rows.push(row);
    }
}

/// Fraction of adjacent sample pairs whose signs differ.
///
/// Uses a three-way sign (zero counts as its own sign), so a step from a
/// positive sample to an exact zero counts as half a crossing. Always in
/// `[0, 1]`; frames shorter than two samples have no pairs and return 0.
pub fn zero_crossing_rate(frame: &[f64]) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }

    let changes: f64 = frame
        .windows(2)
        .map(|pair| (sign(pair[1]) - sign(pair[0])).abs())
        .sum::<f64>()
        / 2.0;

    changes / (frame.len() - 1) as f64
}

/// Mean of squared amplitudes.
pub fn short_term_energy(frame: &[f64]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().map(|x| x * x).sum::<f64>() / frame.len() as f64
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Computes feature vectors for a frame sequence.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    sample_rate: u32,
    feature_set: FeatureSet,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, feature_set: FeatureSet) -> Self {
        Self {
            sample_rate,
            feature_set,
        }
    }

    /// Consume the frames in order and build the feature matrix.
    ///
    /// Frames are processed as they arrive, so the frame sequence is never
    /// buffered. Spectral flux and the delta columns compare each frame with
    /// the one before it; on the first frame they are 0.
    ///
    /// ## Errors:
    /// - `EmptyFrame` if any frame has no samples
    pub fn extract<'a, I>(&self, frames: I) -> AnalysisResult<FeatureMatrix>
    where
        I: IntoIterator<Item = Frame<'a>>,
    {
        let mut matrix = FeatureMatrix::new(self.feature_set.columns());
        let mut analyzer = SpectrumAnalyzer::new();
        let mut previous_spectrum: Option<Vec<f64>> = None;
        let mut previous_values: Option<Vec<f64>> = None;
        let mut banks: Option<(MfccBank, ChromaMap)> = None;

        for frame in frames {
            if frame.is_empty() {
                return Err(AnalysisError::EmptyFrame { index: frame.index });
            }
            if frame.is_padded() {
                trace!(index = frame.index, start = frame.start, "Zero-padded trailing frame");
            }

            let samples: &[f64] = &frame.samples;
            let mut values = Vec::with_capacity(matrix.columns().len());
            values.push(zero_crossing_rate(samples));
            values.push(short_term_energy(samples));

            if self.feature_set.spectral() {
                let spectrum = analyzer.magnitude(samples);
                let (centroid, spread) = spectral::centroid_and_spread(&spectrum, self.sample_rate);
                let flux = previous_spectrum
                    .as_deref()
                    .map(|previous| spectral::flux(&spectrum, previous))
                    .unwrap_or(0.0);

                values.push(spectral::block_entropy(samples));
                values.push(centroid);
                values.push(spread);
                values.push(spectral::block_entropy(&spectrum));
                values.push(flux);
                values.push(spectral::rolloff(&spectrum));

                if self.feature_set.cepstral() {
                    // Frames share one length, so the banks are built once
                    if banks.as_ref().map_or(true, |(mfcc, _)| mfcc.bins() != spectrum.len()) {
                        banks = Some((
                            MfccBank::new(self.sample_rate, spectrum.len()),
                            ChromaMap::new(self.sample_rate, spectrum.len()),
                        ));
                    }
                    if let Some((mfcc, chroma)) = &banks {
                        let (classes, deviation) = chroma.chroma(&spectrum);
                        values.extend(mfcc.mfcc(&spectrum));
                        values.extend(classes);
                        values.push(deviation);
                    }
                }

                previous_spectrum = Some(spectrum);
            }

            if self.feature_set.deltas() {
                let delta: Vec<f64> = match &previous_values {
                    Some(previous) => values.iter().zip(previous).map(|(v, p)| v - p).collect(),
                    None => vec![0.0; values.len()],
                };
                previous_values = Some(values.clone());
                values.extend(delta);
            }

            matrix.push(FeatureVector(values));
        }

        Ok(matrix)
    }
}
