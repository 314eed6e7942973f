//! # Canonical Waveform
//!
//! Whatever container the upload arrives in, decoding ends here: mono,
//! 16-bit signed PCM plus the sample rate it was recorded at.
//!
//! ## Channel policy:
//! Multi-channel audio is mixed down by averaging the channels of every
//! sample frame, rounding to the nearest integer. Every downstream feature
//! depends on this choice, so it lives in exactly one place: [`mix_down`].

use crate::analysis::error::{AnalysisError, AnalysisResult};

/// Decoded mono recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<i16>,
    sample_rate: u32,
    /// How many channels the upload had before mixing down
    source_channels: u16,
}

impl Waveform {
    /// Build a waveform from interleaved multi-channel samples.
    ///
    /// ## Errors:
    /// - `Decode` when the sample rate or channel count is zero, since the
    ///   decoder must have produced nonsense metadata
    pub fn from_interleaved(interleaved: Vec<i16>, channels: u16, sample_rate: u32) -> AnalysisResult<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::Decode("decoded stream reports a sample rate of 0 Hz".to_string()));
        }
        if channels == 0 {
            return Err(AnalysisError::Decode("decoded stream reports zero channels".to_string()));
        }

        let samples = if channels == 1 {
            interleaved
        } else {
            mix_down(&interleaved, channels as usize)
        };

        Ok(Self {
            samples,
            sample_rate,
            source_channels: channels,
        })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds: number_of_samples / sample_rate
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Average interleaved channels into one.
///
/// A trailing partial sample frame (fewer values than `channels`) is dropped.
pub fn mix_down(interleaved: &[i16], channels: usize) -> Vec<i16> {
    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum as f64 / channels as f64).round() as i16
        })
        .collect()
}
