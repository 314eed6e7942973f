//! Runtime configuration endpoints (`GET`/`PUT /api/v1/config`).

use crate::{config::AppConfig, error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

fn config_json(config: &AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "analysis": {
            "frame_duration_secs": config.analysis.frame_duration_secs,
            "hop_duration_secs": config.analysis.hop_duration_secs,
            "trailing_frame": config.analysis.trailing_frame,
            "feature_set": config.analysis.feature_set,
            "feature_names": config.analysis.feature_set.columns().iter().map(|c| c.name()).collect::<Vec<_>>()
        },
        "upload": {
            "max_file_size_bytes": config.upload.max_file_size_bytes,
            "field_names": config.upload.field_names
        },
        "performance": {
            "max_concurrent_analyses": config.performance.max_concurrent_analyses,
            "analysis_timeout_secs": config.performance.analysis_timeout_secs
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&config)
    })))
}

/// Apply a partial update. Server host/port changes are stored but only take
/// effect on the next restart; analysis and performance changes apply to the
/// next request.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    info!(
        trailing_frame = ?current_config.analysis.trailing_frame,
        feature_set = ?current_config.analysis.feature_set,
        max_concurrent_analyses = current_config.performance.max_concurrent_analyses,
        "Configuration updated"
    );

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    fn app_state() -> AppState {
        AppState::new(AppConfig::default())
    }

    #[actix_web::test]
    async fn test_get_config() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state()))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["config"]["analysis"]["trailing_frame"], "drop");
        assert_eq!(json["config"]["analysis"]["feature_names"].as_array().unwrap().len(), 8);
        assert_eq!(json["config"]["upload"]["field_names"][0], "file");
    }

    #[actix_web::test]
    async fn test_update_config_applies_to_pipeline() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"analysis": {"trailing_frame": "pad"}}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            state.get_pipeline().config().trailing_frame,
            crate::analysis::framer::TrailingFramePolicy::Pad
        );
    }

    #[actix_web::test]
    async fn test_update_config_selects_extended_features() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"analysis": {"feature_set": "extended_deltas"}}))
            .to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["updated_config"]["analysis"]["feature_set"], "extended_deltas");
        assert_eq!(json["updated_config"]["analysis"]["feature_names"].as_array().unwrap().len(), 68);
        assert_eq!(
            state.get_pipeline().config().feature_set,
            crate::analysis::features::FeatureSet::ExtendedDeltas
        );
    }

    #[actix_web::test]
    async fn test_update_config_rejects_huge_hop() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"analysis": {"hop_duration_secs": 1e300}}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.get_config().analysis.hop_duration_secs, 0.025);
    }

    #[actix_web::test]
    async fn test_update_config_rejects_invalid() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"analysis": {"hop_duration_secs": 0.0}}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.get_config().analysis.hop_duration_secs, 0.025);
    }
}
