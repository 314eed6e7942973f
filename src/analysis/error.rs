//! # Analysis Errors
//!
//! Every stage of the emotion pipeline reports failure through [`AnalysisError`].
//! The pipeline stops at the first error; nothing is retried because the
//! analysis is deterministic and the same bytes would fail the same way.
//!
//! ## Who handles what:
//! - **EmptyInput**: the caller forgot the file, so it maps to a 400
//! - **everything else**: a processing failure, reported as a 500 with the cause attached

use thiserror::Error;

/// Failure kinds of the decode → frame → extract → classify pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// No audio payload was supplied (missing field or zero bytes).
    #[error("no audio payload was provided")]
    EmptyInput,

    /// The bytes are not a recognizable or decodable audio container.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// Frame or hop length resolved to zero samples.
    #[error("invalid frame configuration: frame length {frame_length}, hop length {hop_length}")]
    InvalidFrameConfig {
        frame_length: usize,
        hop_length: usize,
    },

    /// A frame reached feature extraction without any samples.
    #[error("frame {index} contains no samples")]
    EmptyFrame { index: usize },

    /// No feature rows to aggregate, usually because the recording is
    /// shorter than one frame.
    #[error("no features to classify: {reason}")]
    EmptyFeatureMatrix { reason: String },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
