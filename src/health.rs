use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    let memory_info = get_memory_info();
    let system_status = get_system_status(&config, &metrics);

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_analyses": metrics.active_analyses,
            "analyses_completed": metrics.analyses_completed,
            "analyses_failed": metrics.analyses_failed
        },
        "memory": memory_info,
        "analysis": {
            "frame_duration_secs": config.analysis.frame_duration_secs,
            "hop_duration_secs": config.analysis.hop_duration_secs,
            "trailing_frame": config.analysis.trailing_frame,
            "feature_set": config.analysis.feature_set,
            "labels": crate::analysis::EmotionLabel::ALL
        },
        "system": system_status
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let config = state.get_config();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    let emotions: serde_json::Map<String, serde_json::Value> = metrics
        .emotion_counts
        .iter()
        .map(|(label, count)| (label.to_string(), json!(count)))
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "analyses": {
            "active": metrics.active_analyses,
            "completed": metrics.analyses_completed,
            "failed": metrics.analyses_failed,
            "emotions": emotions
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "performance": {
            "max_concurrent_analyses": config.performance.max_concurrent_analyses,
            "analysis_timeout_secs": config.performance.analysis_timeout_secs,
            "available_slots": state.analysis_slots().available_permits()
        }
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let read_kb = |prefix: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(prefix))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };

            return json!({
                "resident_memory_bytes": read_kb("VmRSS:"),
                "virtual_memory_bytes": read_kb("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

/// Load is the share of analysis slots currently in use.
fn get_system_status(config: &crate::config::AppConfig, metrics: &crate::state::AppMetrics) -> serde_json::Value {
    let max = config.performance.max_concurrent_analyses;
    let usage = if max > 0 {
        metrics.active_analyses as f64 / max as f64
    } else {
        0.0
    };

    let status = if usage > 0.9 {
        "high_load"
    } else if usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "analysis_slot_usage_percent": (usage * 100.0).round(),
        "max_concurrent_analyses": max,
        "active_analyses": metrics.active_analyses,
        "load_warnings": if usage > 0.8 {
            vec!["High analysis load - consider increasing max_concurrent_analyses"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EmotionLabel;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(AppConfig::default())))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["analysis"]["trailing_frame"], "drop");
        assert_eq!(json["system"]["status"], "normal");
    }

    #[actix_web::test]
    async fn test_metrics_lists_every_emotion() {
        let state = AppState::new(AppConfig::default());
        state.record_emotion(EmotionLabel::Happy);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["analyses"]["emotions"]["happy"], 1);
        assert_eq!(json["analyses"]["emotions"]["angry"], 0);
        assert_eq!(json["analyses"]["completed"], 1);
        assert_eq!(json["performance"]["available_slots"], 4);
    }
}
