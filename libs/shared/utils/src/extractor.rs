use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
    Json,
};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

// Middleware guarding admin routes; open when no ADMIN_API_KEY is configured
pub async fn admin_key_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = config.admin_api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .ok_or_else(|| AppError::Auth("Missing admin key header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid admin key header format".to_string()))?;

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!("Rejected admin request to {}", request.uri().path());
        return Err(AppError::Auth("Invalid admin key".to_string()));
    }

    Ok(next.run(request).await)
}

/// JSON body extractor whose rejections go through `AppError`, so a malformed body answers
/// 400 `{"error": ...}` like every other validation failure.
#[derive(Debug, Clone, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                debug!("Rejected request body: {}", rejection.body_text());
                Err(AppError::ValidationError(rejection.body_text()))
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::to_bytes,
        http::StatusCode,
        middleware,
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(admin_api_key: Option<&str>) -> Router {
        let config = Arc::new(AppConfig {
            admin_api_key: admin_api_key.map(str::to_string),
            ..AppConfig::default()
        });
        Router::new()
            .route("/admin/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(config, admin_key_middleware))
    }

    fn request(key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/admin/ping");
        if let Some(key) = key {
            builder = builder.header(ADMIN_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn open_when_no_key_configured() {
        let response = app(None).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_key() {
        let missing = app(Some("s3cret")).oneshot(request(None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app(Some("s3cret")).oneshot(request(Some("guess"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let right = app(Some("s3cret")).oneshot(request(Some("s3cret"))).await.unwrap();
        assert_eq!(right.status(), StatusCode::OK);
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Slots {
        total_slots: i32,
    }

    async fn echo(ValidatedJson(body): ValidatedJson<Slots>) -> String {
        body.total_slots.to_string()
    }

    async fn post_body(content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
        let app = Router::new().route("/slots", post(echo));
        let mut builder = Request::builder().method("POST").uri("/slots");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let response = app
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn malformed_bodies_are_validation_errors() {
        let (status, _) = post_body(Some("application/json"), r#"{"totalSlots": 4}"#).await;
        assert_eq!(status, StatusCode::OK);

        for (content_type, body) in [
            (Some("application/json"), r#"{"totalSlots": "five"}"#),
            (Some("application/json"), r#"{"totalSlots": 4"#),
            (None, r#"{"totalSlots": 4}"#),
        ] {
            let (status, body) = post_body(content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].is_string(), "unexpected body {}", body);
        }
    }
}
