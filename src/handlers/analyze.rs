//! # Emotion Analysis Endpoint
//!
//! `POST /analyze` (and `POST /api/v1/analyze`) accepts a multipart upload,
//! runs the emotion pipeline on it and returns the label together with the
//! per-frame feature matrix.
//!
//! ## Request flow:
//! 1. Stream the multipart body, keeping the first field whose name is in `upload.field_names`
//! 2. Reject the upload once it grows past `upload.max_file_size_bytes`
//! 3. Wait for an analysis permit (bounded by `performance.max_concurrent_analyses`)
//! 4. Run the pipeline on actix's blocking thread pool. Steps 3 and 4 share
//!    one `performance.analysis_timeout_secs` deadline
//! 5. Serialize the report, or map the failure through `AppError`

use crate::{
    analysis::AnalysisReport,
    error::{AppError, AppResult},
    state::AppState,
};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The audio file pulled out of the multipart body.
#[derive(Debug)]
struct Upload {
    filename: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    filename: Option<String>,
    size_bytes: usize,
}

/// Successful response body.
///
/// ```json
/// {
///   "analysis_id": "6c1f...",
///   "emotion": "calm",
///   "features": [[0.02, 0.001, ...], ...],
///   "feature_names": ["zcr", "energy", ...],
///   "mean_energy": 0.001,
///   "mean_zcr": 0.02,
///   "frame_count": 39,
///   "sample_rate": 16000,
///   "duration_seconds": 1.0,
///   "frame_length": 800,
///   "hop_length": 400,
///   "processing_time_ms": 4,
///   "file": { "filename": "clip.wav", "size_bytes": 32044 }
/// }
/// ```
#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis_id: Uuid,
    #[serde(flatten)]
    report: AnalysisReport,
    features: Vec<Vec<f64>>,
    processing_time_ms: u64,
    file: FileInfo,
}

/// Handle one analysis upload.
pub async fn analyze_audio(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let start_time = Instant::now();
    let analysis_id = Uuid::new_v4();
    let config = state.get_config();

    let upload = read_upload(payload, &config.upload.field_names, config.upload.max_file_size_bytes)
        .await
        .inspect_err(|e| warn!(%analysis_id, "Rejected upload: {}", e))?
        .ok_or_else(|| {
            warn!(%analysis_id, "Request carried no audio field");
            AppError::BadRequest("No audio file uploaded".to_string())
        })?;

    let file = FileInfo {
        filename: upload.filename.clone(),
        size_bytes: upload.bytes.len(),
    };

    info!(
        %analysis_id,
        filename = file.filename.as_deref().unwrap_or("<unnamed>"),
        size_bytes = file.size_bytes,
        "Received audio for analysis"
    );

    let report = match run_pipeline(&state, upload, config.performance.analysis_timeout_secs).await {
        Ok(report) => report,
        Err(e) => {
            state.record_analysis_failure();
            match &e {
                AppError::BadRequest(_) | AppError::ValidationError(_) => {
                    warn!(%analysis_id, "Analysis rejected: {}", e)
                }
                _ => error!(%analysis_id, "Analysis failed: {}", e),
            }
            return Err(e);
        }
    };

    state.record_emotion(report.emotion);
    let processing_time_ms = start_time.elapsed().as_millis() as u64;

    info!(
        %analysis_id,
        emotion = %report.emotion,
        frames = report.frame_count,
        processing_time_ms,
        "Analysis complete"
    );

    Ok(HttpResponse::Ok().json(AnalyzeResponse {
        analysis_id,
        features: report.matrix.to_nested(),
        report,
        processing_time_ms,
        file,
    }))
}

/// Acquire a permit, then run the pipeline on the blocking pool.
///
/// One deadline covers both the wait for a slot and the analysis itself, so
/// a request queued behind busy slots fails after `timeout_secs` as well.
/// The permit moves into the blocking closure, so a timed-out analysis keeps
/// its slot until the thread actually finishes.
async fn run_pipeline(state: &AppState, upload: Upload, timeout_secs: u64) -> AppResult<AnalysisReport> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);

    let permit = match tokio::time::timeout_at(deadline, state.analysis_slots().acquire_owned()).await {
        Ok(permit) => permit.map_err(|e| AppError::Internal(format!("Analysis slots unavailable: {}", e)))?,
        Err(_) => {
            return Err(AppError::Processing {
                details: format!("no analysis slot became free within {} seconds", timeout_secs),
            })
        }
    };

    let _active = state.begin_analysis();
    let pipeline = state.get_pipeline();

    let job = web::block(move || {
        let _permit = permit;
        pipeline.analyze_named(&upload.bytes, upload.filename.as_deref())
    });

    match tokio::time::timeout_at(deadline, job).await {
        Err(_) => Err(AppError::Processing {
            details: format!("analysis did not finish within {} seconds", timeout_secs),
        }),
        Ok(Err(blocking)) => Err(AppError::Internal(format!("Analysis task failed: {}", blocking))),
        Ok(Ok(result)) => Ok(result?),
    }
}

/// Pull the audio field out of the multipart stream.
///
/// Returns `Ok(None)` when no accepted field is present. A field that exceeds
/// `max_bytes` is rejected as soon as the limit is crossed.
async fn read_upload(
    mut payload: Multipart,
    accepted_fields: &[String],
    max_bytes: usize,
) -> AppResult<Option<Upload>> {
    while let Some(item) = payload.next().await {
        let mut field: Field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };

        let accepted = content_disposition
            .get_name()
            .is_some_and(|name| accepted_fields.iter().any(|f| f == name));
        if !accepted {
            continue;
        }

        let filename = content_disposition.get_filename().map(|s| s.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::ValidationError(format!(
                    "File too large: more than {} bytes",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(Some(Upload { filename, bytes }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::opus::tests::opus_tone_packets;
    use crate::audio::source::tests::{wav_bytes, webm_opus_bytes};
    use crate::config::AppConfig;
    use actix_web::{http::header, http::StatusCode, test, App};

    const BOUNDARY: &str = "emotion-test-boundary";

    fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = BOUNDARY
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post(state: AppState, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/analyze", web::post().to(analyze_audio)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/analyze")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        let json: serde_json::Value = test::read_body_json(resp).await;
        (status, json)
    }

    #[actix_web::test]
    async fn test_analyze_silence() {
        let state = AppState::new(AppConfig::default());
        let wav = wav_bytes(&vec![0; 16000], 1, 16000);
        let (status, json) = post(state.clone(), multipart_body("file", "quiet.wav", &wav)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["emotion"], "calm");
        assert_eq!(json["frame_length"], 800);
        assert_eq!(json["hop_length"], 400);
        assert_eq!(json["frame_count"], 39);
        assert_eq!(json["features"].as_array().unwrap().len(), 39);
        assert_eq!(json["feature_names"][0], "zcr");
        assert_eq!(json["file"]["filename"], "quiet.wav");
        assert_eq!(json["file"]["size_bytes"], wav.len());
        assert!(json["analysis_id"].is_string());

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.emotion_counts[&crate::analysis::EmotionLabel::Calm], 1);
        assert_eq!(metrics.active_analyses, 0);
    }

    #[actix_web::test]
    async fn test_analyze_webm_recording() {
        let state = AppState::new(AppConfig::default());
        let webm = webm_opus_bytes(&opus_tone_packets(440.0, 8000.0, 25));
        let (status, json) = post(state, multipart_body("audio", "emergency_recording_1.webm", &webm)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sample_rate"], 48000);
        assert_eq!(json["file"]["filename"], "emergency_recording_1.webm");
        assert!(json["features"].as_array().unwrap().len() > 10);
    }

    #[actix_web::test]
    async fn test_alternate_field_name() {
        let state = AppState::new(AppConfig::default());
        let wav = wav_bytes(&vec![0; 8000], 1, 8000);
        let (status, _) = post(state, multipart_body("audio", "a.wav", &wav)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_missing_file_field() {
        let state = AppState::new(AppConfig::default());
        let (status, json) = post(state, multipart_body("notes", "n.txt", b"hello")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["type"], "bad_request");
        assert_eq!(json["error"]["message"], "No audio file uploaded");
    }

    #[actix_web::test]
    async fn test_empty_file_field() {
        let state = AppState::new(AppConfig::default());
        let (status, json) = post(state, multipart_body("file", "empty.wav", b"")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "No audio file uploaded");
    }

    #[actix_web::test]
    async fn test_undecodable_file() {
        let state = AppState::new(AppConfig::default());
        let (status, json) = post(state.clone(), multipart_body("file", "notes.txt", b"definitely not audio")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["type"], "processing_error");
        assert_eq!(json["error"]["message"], "Internal Server Error");
        assert!(json["error"]["details"].is_string());
        assert_eq!(state.get_metrics_snapshot().analyses_failed, 1);
    }

    #[actix_web::test]
    async fn test_file_too_large() {
        let mut config = AppConfig::default();
        config.upload.max_file_size_bytes = 64;
        let state = AppState::new(config);
        let wav = wav_bytes(&vec![0; 1000], 1, 8000);
        let (status, json) = post(state, multipart_body("file", "big.wav", &wav)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_queued_request_times_out_while_slots_are_busy() {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_analyses = 1;
        config.performance.analysis_timeout_secs = 1;
        let state = AppState::new(config);

        // Occupy the only slot for the whole request
        let _busy = state.analysis_slots().acquire_owned().await.unwrap();

        let wav = wav_bytes(&vec![0; 8000], 1, 8000);
        let (status, json) = post(state.clone(), multipart_body("file", "queued.wav", &wav)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["type"], "processing_error");
        assert!(json["error"]["details"].as_str().unwrap().contains("no analysis slot"));

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.analyses_failed, 1);
        assert_eq!(metrics.active_analyses, 0);
    }
}
