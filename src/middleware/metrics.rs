use crate::state::AppState;
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, Error,
};
use std::time::Instant;

/// Count every request and record per-endpoint timing.
///
/// Endpoints are keyed by method and route pattern (`POST /analyze`), falling
/// back to the raw path for requests that matched no route.
pub async fn track_metrics(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let raw_path = req.path().to_string();
    let app_state = req.app_data::<web::Data<AppState>>().cloned();

    if let Some(state) = &app_state {
        state.increment_request_count();
    }

    let result = next.call(req).await;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    if let Some(state) = &app_state {
        let (endpoint, is_error) = match &result {
            Ok(response) => {
                let path = response.request().match_pattern().unwrap_or(raw_path);
                let status = response.status();
                (
                    format!("{} {}", method, path),
                    status.is_client_error() || status.is_server_error(),
                )
            }
            Err(_) => (format!("{} {}", method, raw_path), true),
        };

        state.record_endpoint_request(&endpoint, duration_ms, is_error);
        if is_error {
            state.increment_error_count();
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{middleware::from_fn, test, App, HttpResponse};

    #[actix_web::test]
    async fn test_records_route_pattern_and_errors() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(from_fn(track_metrics))
                .route("/items/{id}", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        test::call_service(&app, test::TestRequest::get().uri("/items/1").to_request()).await;
        test::call_service(&app, test::TestRequest::get().uri("/items/2").to_request()).await;
        test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 3);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.endpoint_metrics["GET /items/{id}"].request_count, 2);
        assert_eq!(metrics.endpoint_metrics["GET /missing"].error_count, 1);
    }
}
