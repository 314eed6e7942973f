//! # Emotion Pipeline
//!
//! Runs the whole analysis for one upload:
//!
//! ```text
//! bytes → SignalSource → Waveform → normalize → Framer → FeatureExtractor → EmotionClassifier
//! ```
//!
//! The pipeline holds nothing but its configuration, so one instance can be
//! shared by every request. Each call owns its intermediate buffers and
//! drops them when it returns. The first failing stage ends the run.

use crate::analysis::classifier::{EmotionClassifier, EmotionLabel};
use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::features::{FeatureExtractor, FeatureMatrix};
use crate::analysis::framer::Framer;
use crate::audio::processor::normalize_signal;
use crate::audio::source::{AudioDecoder, SignalSource};
use crate::audio::waveform::Waveform;
use crate::config::AnalysisConfig;
use serde::Serialize;
use tracing::debug;

/// Everything the pipeline learned about one recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub emotion: EmotionLabel,
    pub mean_energy: f64,
    pub mean_zcr: f64,
    pub feature_names: Vec<String>,
    #[serde(skip)]
    pub matrix: FeatureMatrix,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub source_channels: u16,
    pub duration_seconds: f64,
    pub frame_length: usize,
    pub hop_length: usize,
}

/// Stateless analysis service.
#[derive(Debug, Clone)]
pub struct EmotionPipeline {
    config: AnalysisConfig,
    classifier: EmotionClassifier,
}

impl EmotionPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            classifier: EmotionClassifier::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Decode and analyze raw upload bytes.
    pub fn analyze(&self, bytes: &[u8]) -> AnalysisResult<AnalysisReport> {
        self.analyze_with(&AudioDecoder::new(), bytes)
    }

    /// Like [`EmotionPipeline::analyze`], using the upload's filename as a
    /// format hint.
    pub fn analyze_named(&self, bytes: &[u8], filename: Option<&str>) -> AnalysisResult<AnalysisReport> {
        self.analyze_with(&AudioDecoder::for_filename(filename), bytes)
    }

    /// Decode with a specific signal source, then analyze.
    pub fn analyze_with(&self, source: &dyn SignalSource, bytes: &[u8]) -> AnalysisResult<AnalysisReport> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        let waveform = source.decode(bytes)?;
        self.analyze_waveform(&waveform)
    }

    /// Analyze an already-decoded waveform.
    ///
    /// ## Errors:
    /// - `InvalidFrameConfig` if the sample rate is too low for the configured durations
    /// - `EmptyFeatureMatrix` if the recording is shorter than one frame
    pub fn analyze_waveform(&self, waveform: &Waveform) -> AnalysisResult<AnalysisReport> {
        if waveform.is_empty() {
            return Err(AnalysisError::EmptyFeatureMatrix {
                reason: "decoded audio contains no samples".to_string(),
            });
        }

        let framer = Framer::for_sample_rate(
            waveform.sample_rate(),
            self.config.frame_duration_secs,
            self.config.hop_duration_secs,
            self.config.trailing_frame,
        )?;

        debug!(
            sample_rate = waveform.sample_rate(),
            samples = waveform.len(),
            channels = waveform.source_channels(),
            frame_length = framer.frame_length(),
            hop_length = framer.hop_length(),
            "Framing waveform"
        );

        let signal = normalize_signal(waveform);
        let extractor = FeatureExtractor::new(waveform.sample_rate(), self.config.feature_set);
        let matrix = extractor.extract(framer.frames(&signal))?;

        if matrix.is_empty() {
            return Err(AnalysisError::EmptyFeatureMatrix {
                reason: format!(
                    "audio has {} samples but one frame needs {}",
                    waveform.len(),
                    framer.frame_length()
                ),
            });
        }

        let classification = self.classifier.classify(&matrix)?;

        debug!(
            frames = matrix.len(),
            mean_energy = classification.mean_energy,
            mean_zcr = classification.mean_zcr,
            emotion = %classification.emotion,
            "Classified recording"
        );

        Ok(AnalysisReport {
            emotion: classification.emotion,
            mean_energy: classification.mean_energy,
            mean_zcr: classification.mean_zcr,
            feature_names: matrix.feature_names(),
            frame_count: matrix.len(),
            sample_rate: waveform.sample_rate(),
            source_channels: waveform.source_channels(),
            duration_seconds: waveform.duration_seconds(),
            frame_length: framer.frame_length(),
            hop_length: framer.hop_length(),
            matrix,
        })
    }
}
