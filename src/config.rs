//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_ANALYSIS__TRAILING_FRAME`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore because many field
//! names contain single underscores.

use crate::analysis::features::FeatureSet;
use crate::analysis::framer::TrailingFramePolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub upload: UploadConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Frame geometry and feature selection for the emotion pipeline.
///
/// ## Fields:
/// - `frame_duration_secs`: analysis window length (0.050 = 50 ms)
/// - `hop_duration_secs`: distance between window starts (0.025 = 25 ms)
/// - `trailing_frame`: `drop` leftover samples, or `pad` them into one last frame
/// - `feature_set`: `basic` (zcr + energy), `full` (time + spectral),
///   `extended` (adds MFCC and chroma) or `extended_deltas` (adds their deltas)
///
/// The emotion thresholds assume the defaults; changing the durations
/// changes what the labels mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub frame_duration_secs: f64,
    pub hop_duration_secs: f64,
    pub trailing_frame: TrailingFramePolicy,
    pub feature_set: FeatureSet,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_duration_secs: 0.050,
            hop_duration_secs: 0.025,
            trailing_frame: TrailingFramePolicy::Drop,
            feature_set: FeatureSet::Full,
        }
    }
}

/// Limits for the multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted audio payload in bytes
    pub max_file_size_bytes: usize,
    /// Multipart field names that may carry the audio file
    pub field_names: Vec<String>,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_analyses`: pipelines allowed to run at once; further requests wait
/// - `analysis_timeout_secs`: an analysis still running after this is abandoned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_analyses: usize,
    pub analysis_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            analysis: AnalysisConfig::default(),
            upload: UploadConfig {
                max_file_size_bytes: 15 * 1024 * 1024,  // 15MB
                field_names: vec!["file".to_string(), "audio".to_string()],
            },
            performance: PerformanceConfig {
                max_concurrent_analyses: 4,
                analysis_timeout_secs: 30,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_ANALYSIS__TRAILING_FRAME=pad`: Pad the last partial frame
    /// - `APP_UPLOAD__MAX_FILE_SIZE_BYTES=1048576`: 1MB upload limit
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Frame and hop durations are finite and positive
    /// - Upload limit is positive and at least one field name is accepted
    /// - Concurrency and timeout are positive
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        self.analysis.validate()?;

        if self.upload.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.upload.field_names.iter().all(|name| name.trim().is_empty()) {
            return Err(anyhow::anyhow!("At least one upload field name is required"));
        }

        if self.performance.max_concurrent_analyses == 0 {
            return Err(anyhow::anyhow!("Max concurrent analyses must be greater than 0"));
        }

        if self.performance.analysis_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Analysis timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present are changed. For example
    /// `{"analysis": {"trailing_frame": "pad"}}` switches the trailing-frame
    /// policy and leaves everything else alone. The result is validated
    /// before it is accepted; on error `self` may be partially modified, so
    /// callers update a copy.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port {} is out of range", port))?;
            }
        }

        if let Some(analysis) = partial_config.get("analysis") {
            if let Some(frame) = analysis.get("frame_duration_secs").and_then(|v| v.as_f64()) {
                self.analysis.frame_duration_secs = frame;
            }
            if let Some(hop) = analysis.get("hop_duration_secs").and_then(|v| v.as_f64()) {
                self.analysis.hop_duration_secs = hop;
            }
            if let Some(policy) = analysis.get("trailing_frame").and_then(|v| v.as_str()) {
                self.analysis.trailing_frame = policy.parse().map_err(anyhow::Error::msg)?;
            }
            if let Some(set) = analysis.get("feature_set").and_then(|v| v.as_str()) {
                self.analysis.feature_set = set.parse().map_err(anyhow::Error::msg)?;
            }
        }

        if let Some(upload) = partial_config.get("upload") {
            if let Some(max) = upload.get("max_file_size_bytes").and_then(|v| v.as_u64()) {
                self.upload.max_file_size_bytes = max as usize;
            }
            if let Some(names) = upload.get("field_names").and_then(|v| v.as_array()) {
                self.upload.field_names = names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect();
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(max) = performance.get("max_concurrent_analyses").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_analyses = max as usize;
            }
            if let Some(timeout) = performance.get("analysis_timeout_secs").and_then(|v| v.as_u64()) {
                self.performance.analysis_timeout_secs = timeout;
            }
        }

        self.validate()?;
        Ok(())
    }
}

/// Longest frame or hop accepted. Ten seconds at 192 kHz is under two
/// million samples per frame.
pub const MAX_WINDOW_SECS: f64 = 10.0;

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.frame_duration_secs.is_finite() || self.frame_duration_secs <= 0.0 {
            return Err(anyhow::anyhow!("Frame duration must be a positive number of seconds"));
        }

        if !self.hop_duration_secs.is_finite() || self.hop_duration_secs <= 0.0 {
            return Err(anyhow::anyhow!("Hop duration must be a positive number of seconds"));
        }

        if self.frame_duration_secs > MAX_WINDOW_SECS || self.hop_duration_secs > MAX_WINDOW_SECS {
            return Err(anyhow::anyhow!(
                "Frame and hop durations must not exceed {} seconds",
                MAX_WINDOW_SECS
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.analysis.frame_duration_secs, 0.050);
        assert_eq!(config.analysis.hop_duration_secs, 0.025);
        assert_eq!(config.analysis.trailing_frame, TrailingFramePolicy::Drop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.hop_duration_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upload.field_names.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_durations_are_bounded() {
        let mut config = AppConfig::default();
        config.analysis.hop_duration_secs = 1e300;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.frame_duration_secs = MAX_WINDOW_SECS + 0.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.frame_duration_secs = MAX_WINDOW_SECS;
        config.analysis.hop_duration_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"analysis": {"hop_duration_secs": 1e300}}"#).is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "analysis": {"trailing_frame": "pad", "feature_set": "basic"}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.analysis.trailing_frame, TrailingFramePolicy::Pad);
        assert_eq!(config.analysis.feature_set, FeatureSet::Basic);
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.analysis.frame_duration_secs, 0.050);
    }

    #[test]
    fn test_config_update_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"analysis": {"frame_duration_secs": -1.0}}"#).is_err());

        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"analysis": {"trailing_frame": "wrap"}}"#).is_err());

        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"server": {"port": 70000}}"#).is_err());
    }

    #[test]
    fn test_enum_values_round_trip_through_serde() {
        let json = serde_json::to_value(AnalysisConfig::default()).unwrap();
        assert_eq!(json["trailing_frame"], "drop");
        assert_eq!(json["feature_set"], "full");
    }
}
