//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple HTTP request handlers
//! simultaneously: the live configuration, the emotion pipeline built from it, the permits that
//! bound concurrent analyses, and the counters behind `/health` and `/api/v1/metrics`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (many HTTP handlers can hold a reference)
//! - **RwLock**: Many readers OR one writer at a time
//! - **T**: The actual data type being protected
//!
//! ### Lock poisoning
//! A `std::sync::RwLock` becomes "poisoned" if a thread panics while holding it.
//! Everything stored here stays consistent after any single write, so we recover
//! the inner value with `PoisonError::into_inner` instead of panicking the request.
//!
//! ### RAII guards
//! [`ActiveAnalysis`] increments the active-analysis gauge when created and decrements it
//! in `Drop`, so the gauge is correct on every exit path, including early `?` returns.

use crate::analysis::{EmotionLabel, EmotionPipeline};
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::Semaphore;

/// The main application state that's shared across all HTTP request handlers.
///
/// Cloning is cheap: every field is an `Arc` or `Copy`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime via `PUT /api/v1/config`)
    pub config: Arc<RwLock<AppConfig>>,

    /// Pipeline built from `config.analysis`; replaced whenever the config changes
    pub pipeline: Arc<RwLock<EmotionPipeline>>,

    /// Permits for concurrently running analyses, sized by
    /// `performance.max_concurrent_analyses`. Replaced (not resized) on config updates,
    /// so analyses already holding a permit from the old semaphore finish normally.
    pub analysis_slots: Arc<RwLock<Arc<Semaphore>>>,

    /// Request and analysis counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: load and reliability
/// - **active_analyses**: pipelines running right now (capacity planning)
/// - **analyses_completed / analyses_failed**: pipeline outcomes
/// - **emotion_counts**: how often each label has been returned
/// - **endpoint_metrics**: per-endpoint timings
#[derive(Debug, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_analyses: u32,
    pub analyses_completed: u64,
    pub analyses_failed: u64,
    pub emotion_counts: HashMap<EmotionLabel, u64>,
    /// Key: endpoint name (e.g., "POST /analyze")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

impl Default for AppMetrics {
    /// Every label starts at zero so the metrics endpoint always lists all four.
    fn default() -> Self {
        Self {
            request_count: 0,
            error_count: 0,
            active_analyses: 0,
            analyses_completed: 0,
            analyses_failed: 0,
            emotion_counts: EmotionLabel::ALL.iter().map(|label| (*label, 0)).collect(),
            endpoint_metrics: HashMap::new(),
        }
    }
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Holds one slot of the active-analysis gauge for as long as it lives.
#[derive(Debug)]
pub struct ActiveAnalysis {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for ActiveAnalysis {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_analyses = metrics.active_analyses.saturating_sub(1);
    }
}

impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// ## What this does:
    /// 1. Builds the pipeline from `config.analysis`
    /// 2. Sizes the analysis semaphore from `config.performance`
    /// 3. Starts metrics at zero and records the start time
    pub fn new(config: AppConfig) -> Self {
        let pipeline = EmotionPipeline::new(config.analysis.clone());
        let slots = Arc::new(Semaphore::new(config.performance.max_concurrent_analyses));

        Self {
            config: Arc::new(RwLock::new(config)),
            pipeline: Arc::new(RwLock::new(pipeline)),
            analysis_slots: Arc::new(RwLock::new(slots)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        lock.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        Self::read(&self.config).clone()
    }

    /// The pipeline to use for the next analysis.
    ///
    /// The pipeline only holds its configuration, so handing out a clone lets
    /// the analysis run on the blocking pool without holding the lock.
    pub fn get_pipeline(&self) -> EmotionPipeline {
        Self::read(&self.pipeline).clone()
    }

    /// The semaphore new analyses should acquire a permit from.
    pub fn analysis_slots(&self) -> Arc<Semaphore> {
        Arc::clone(&Self::read(&self.analysis_slots))
    }

    /// Validate and apply a new configuration.
    ///
    /// The pipeline is rebuilt when the analysis section changed and the
    /// semaphore is replaced when the concurrency limit changed.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;

        let mut config = Self::write(&self.config);

        if config.analysis != new_config.analysis {
            *Self::write(&self.pipeline) = EmotionPipeline::new(new_config.analysis.clone());
        }

        let limit = new_config.performance.max_concurrent_analyses;
        if config.performance.max_concurrent_analyses != limit {
            *Self::write(&self.analysis_slots) = Arc::new(Semaphore::new(limit));
        }

        *config = new_config;
        Ok(())
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        Self::write(&self.metrics).request_count += 1;
    }

    /// Increment the total error counter (any 4xx or 5xx response).
    pub fn increment_error_count(&self) {
        Self::write(&self.metrics).error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## Parameters:
    /// - **endpoint**: The API endpoint (e.g., "GET /health", "POST /analyze")
    /// - **duration_ms**: How long the request took to process
    /// - **is_error**: Whether this request resulted in an error
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = Self::write(&self.metrics);
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark an analysis as running until the returned guard is dropped.
    pub fn begin_analysis(&self) -> ActiveAnalysis {
        Self::write(&self.metrics).active_analyses += 1;
        ActiveAnalysis {
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Count a successful analysis and the label it produced.
    pub fn record_emotion(&self, emotion: EmotionLabel) {
        let mut metrics = Self::write(&self.metrics);
        metrics.analyses_completed += 1;
        *metrics.emotion_counts.entry(emotion).or_insert(0) += 1;
    }

    pub fn record_analysis_failure(&self) {
        Self::write(&self.metrics).analyses_failed += 1;
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones the data so we don't hold the lock while serializing the response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        Self::read(&self.metrics).clone()
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    /// Fraction of all requests that ended in an error (0.0 when idle).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::framer::TrailingFramePolicy;

    #[test]
    fn test_emotion_counts_start_at_zero() {
        let state = AppState::new(AppConfig::default());
        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.emotion_counts.len(), 4);
        assert!(metrics.emotion_counts.values().all(|count| *count == 0));
    }

    #[test]
    fn test_record_emotion() {
        let state = AppState::new(AppConfig::default());
        state.record_emotion(EmotionLabel::Calm);
        state.record_emotion(EmotionLabel::Calm);
        state.record_emotion(EmotionLabel::Angry);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.emotion_counts[&EmotionLabel::Calm], 2);
        assert_eq!(metrics.emotion_counts[&EmotionLabel::Angry], 1);
        assert_eq!(metrics.analyses_completed, 3);
    }

    #[test]
    fn test_active_analysis_guard() {
        let state = AppState::new(AppConfig::default());
        {
            let _first = state.begin_analysis();
            let _second = state.begin_analysis();
            assert_eq!(state.get_metrics_snapshot().active_analyses, 2);
        }
        assert_eq!(state.get_metrics_snapshot().active_analyses, 0);
    }

    #[test]
    fn test_update_config_rebuilds_pipeline() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(state.get_pipeline().config().trailing_frame, TrailingFramePolicy::Drop);

        let mut config = state.get_config();
        config.analysis.trailing_frame = TrailingFramePolicy::Pad;
        config.performance.max_concurrent_analyses = 2;
        state.update_config(config).unwrap();

        assert_eq!(state.get_pipeline().config().trailing_frame, TrailingFramePolicy::Pad);
        assert_eq!(state.analysis_slots().available_permits(), 2);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let state = AppState::new(AppConfig::default());
        let mut config = state.get_config();
        config.performance.max_concurrent_analyses = 0;

        assert!(state.update_config(config).is_err());
        assert_eq!(state.get_config().performance.max_concurrent_analyses, 4);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /analyze", 30, false);
        state.record_endpoint_request("POST /analyze", 10, true);

        let metrics = state.get_metrics_snapshot();
        let endpoint = &metrics.endpoint_metrics["POST /analyze"];
        assert_eq!(endpoint.request_count, 2);
        assert_eq!(endpoint.average_duration_ms(), 20.0);
        assert_eq!(endpoint.error_rate(), 0.5);
    }
}
