//! # Framing
//!
//! Slices the normalized signal into fixed-length analysis frames. Frames
//! start at `0, H, 2H, ...` and are handed out lazily; full frames borrow the
//! signal, only a padded trailing frame allocates.
//!
//! ## Trailing samples:
//! - **Drop** (default): a frame is emitted only while `start + L <= N`,
//!   giving `floor((N - L) / H) + 1` frames when `N >= L` and none otherwise
//! - **Pad**: additionally emit one zero-padded frame at the next hop offset
//!   when the full frames leave samples at the end uncovered

use crate::analysis::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// What to do with samples left over after the last full frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingFramePolicy {
    #[default]
    Drop,
    Pad,
}

impl std::str::FromStr for TrailingFramePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(TrailingFramePolicy::Drop),
            "pad" => Ok(TrailingFramePolicy::Pad),
            other => Err(format!("unknown trailing frame policy '{}', expected 'drop' or 'pad'", other)),
        }
    }
}

/// One analysis window over the signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<'a> {
    /// Position in the frame sequence (0-based)
    pub index: usize,
    /// Offset of the first sample in the signal
    pub start: usize,
    pub samples: Cow<'a, [f64]>,
}

impl Frame<'_> {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True for the zero-padded trailing frame.
    pub fn is_padded(&self) -> bool {
        matches!(self.samples, Cow::Owned(_))
    }
}

/// Frame geometry in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framer {
    frame_length: usize,
    hop_length: usize,
    policy: TrailingFramePolicy,
}

impl Framer {
    /// ## Errors:
    /// `InvalidFrameConfig` when either length is zero.
    pub fn new(frame_length: usize, hop_length: usize, policy: TrailingFramePolicy) -> AnalysisResult<Self> {
        if frame_length == 0 || hop_length == 0 {
            return Err(AnalysisError::InvalidFrameConfig { frame_length, hop_length });
        }

        Ok(Self {
            frame_length,
            hop_length,
            policy,
        })
    }

    /// Derive frame and hop lengths from durations: `floor(seconds * sample_rate)`.
    ///
    /// ## Example:
    /// 50 ms frames with a 25 ms hop at 16 kHz → `L = 800`, `H = 400`
    pub fn for_sample_rate(
        sample_rate: u32,
        frame_seconds: f64,
        hop_seconds: f64,
        policy: TrailingFramePolicy,
    ) -> AnalysisResult<Self> {
        let frame_length = samples_for(frame_seconds, sample_rate);
        let hop_length = samples_for(hop_seconds, sample_rate);
        Self::new(frame_length, hop_length, policy)
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Number of frames [`Framer::frames`] yields for a signal of `total_samples`.
    pub fn frame_count(&self, total_samples: usize) -> usize {
        let full = if total_samples >= self.frame_length {
            (total_samples - self.frame_length) / self.hop_length + 1
        } else {
            0
        };

        match self.policy {
            TrailingFramePolicy::Drop => full,
            TrailingFramePolicy::Pad => {
                if total_samples == 0 {
                    0
                } else if full == 0 {
                    1
                } else {
                    // Both products are bounded by total_samples unless the hop is huge
                    let covered = (full - 1)
                        .checked_mul(self.hop_length)
                        .and_then(|offset| offset.checked_add(self.frame_length));
                    let next_start = full.checked_mul(self.hop_length);
                    match (covered, next_start) {
                        (Some(covered), Some(next_start)) => {
                            full + usize::from(covered < total_samples && next_start < total_samples)
                        }
                        _ => full,
                    }
                }
            }
        }
    }

    /// Lazily iterate over the frames of `signal`.
    pub fn frames<'a>(&self, signal: &'a [f64]) -> Frames<'a> {
        Frames {
            signal,
            framer: *self,
            next_start: 0,
            index: 0,
            done: false,
        }
    }
}

fn samples_for(seconds: f64, sample_rate: u32) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).floor() as usize
}

/// Iterator returned by [`Framer::frames`].
#[derive(Debug)]
pub struct Frames<'a> {
    signal: &'a [f64],
    framer: Framer,
    next_start: usize,
    index: usize,
    done: bool,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let total = self.signal.len();
        let start = self.next_start;
        let end = start.checked_add(self.framer.frame_length);

        let samples = if let Some(end) = end.filter(|&end| end <= total) {
            Cow::Borrowed(&self.signal[start..end])
        } else {
            // Past the last full frame; at most one padded frame may follow
            self.done = true;
            if self.framer.policy == TrailingFramePolicy::Drop || !self.has_uncovered_tail(start) {
                return None;
            }
            let tail = &self.signal[start.min(total)..];
            let mut padded = Vec::new();
            if padded.try_reserve_exact(self.framer.frame_length).is_err() {
                return None;
            }
            padded.extend_from_slice(tail);
            padded.resize(self.framer.frame_length, 0.0);
            Cow::Owned(padded)
        };

        let frame = Frame {
            index: self.index,
            start,
            samples,
        };
        self.index += 1;
        match self.next_start.checked_add(self.framer.hop_length) {
            Some(next_start) => self.next_start = next_start,
            None => self.done = true,
        }
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.framer.frame_count(self.signal.len()).saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl Frames<'_> {
    /// Whether samples remain that no full frame has covered.
    fn has_uncovered_tail(&self, start: usize) -> bool {
        let total = self.signal.len();
        if total == 0 {
            return false;
        }
        if self.index == 0 {
            return true;
        }
        let last_start = start - self.framer.hop_length;
        last_start
            .checked_add(self.framer.frame_length)
            .is_some_and(|covered| covered < total)
            && start < total
    }
}
