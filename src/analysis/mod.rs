//! # Emotion Analysis Module
//!
//! The numeric core of the service: framing, per-frame features and the
//! rule-based emotion label.
//!
//! ## Key Components:
//! - **Framer**: fixed-length, hop-spaced analysis windows over the signal
//! - **FeatureExtractor**: zero-crossing rate, energy, spectral descriptors and optional MFCC/chroma per frame
//! - **EmotionClassifier**: mean energy / mean ZCR → angry, calm, happy or neutral
//! - **EmotionPipeline**: ties decoding and the stages above into one call
//!
//! ## Default Frame Geometry:
//! - **Frame**: 50 ms (`0.050 × sample_rate` samples)
//! - **Hop**: 25 ms (`0.025 × sample_rate` samples), i.e. 50% overlap
//! - **Trailing samples**: dropped unless the pad policy is configured

pub mod cepstral;     // MFCC and chroma
pub mod classifier;   // Ordered threshold rule
pub mod error;        // AnalysisError shared by every stage
pub mod features;     // Per-frame feature vectors and the feature matrix
pub mod framer;       // Frame slicing
pub mod pipeline;     // End-to-end analysis service
pub mod spectral;     // FFT magnitude and spectral descriptors

pub use classifier::EmotionLabel;
pub use pipeline::{AnalysisReport, EmotionPipeline};
