use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{DensityHandler, Predictor};
use crate::models::ImageRequest;
use crate::services::chat::check_image_reference;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub density: Arc<DensityHandler>,
}

pub fn create_router(predictor: Arc<Predictor>, density: Arc<DensityHandler>) -> Router {
    let state = Arc::new(AppState { predictor, density });

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/echo", post(echo_handler))
        .route("/predict", post(predict_handler))
        .route("/description", post(description_handler))
        .route("/density/process-foods", post(process_foods_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Content-type check plus JSON parse shared by the image endpoints.
fn parse_json_body(headers: &HeaderMap, body: &str) -> Result<Value, Response> {
    if !is_json(headers) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Content-Type must be application/json",
        ));
    }

    serde_json::from_str(body).map_err(|e| {
        log::error!("❌ Failed to parse JSON body: {}", e);
        error_response(StatusCode::BAD_REQUEST, "Invalid JSON format")
    })
}

fn parse_image_request(headers: &HeaderMap, body: &str) -> Result<ImageRequest, Response> {
    let value = parse_json_body(headers, body)?;
    let request: ImageRequest = serde_json::from_value(value).map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, "Request must include an \"image\" field")
    })?;

    if let Err(e) = check_image_reference(&request.image) {
        log::warn!("⚠️ Rejected image reference: {:#}", e);
        return Err(error_response(StatusCode::BAD_REQUEST, &format!("{:#}", e)));
    }
    Ok(request)
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the Food Weight Estimator API.",
        "status": "healthy",
        "timestamp": timestamp(),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": timestamp(),
    }))
}

async fn echo_handler(headers: HeaderMap, body: String) -> Response {
    match parse_json_body(&headers, &body) {
        Ok(data) => Json(json!({
            "message": "Echo response",
            "data": data,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(response) => response,
    }
}

async fn predict_handler(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    body: String,
) -> Response {
    let request = match parse_image_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    log::info!("🔔 Prediction requested for {}", request.image);

    match state.predictor.predict(&request.image).await {
        Ok(weights) => Json(json!({
            "response": weights,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(e) => {
            log::error!("❌ Prediction failed: {:#}", e);
            error_response(StatusCode::BAD_GATEWAY, &format!("{:#}", e))
        }
    }
}

async fn description_handler(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    body: String,
) -> Response {
    let request = match parse_image_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.predictor.get_description(&request.image).await {
        Ok(description) => Json(json!({
            "response": description,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(e) => {
            log::error!("❌ Description failed: {:#}", e);
            error_response(StatusCode::BAD_GATEWAY, &format!("{:#}", e))
        }
    }
}

async fn process_foods_handler(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    body: String,
) -> Response {
    let bad_request = |message: &str| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": message, "foods": [] })),
        )
            .into_response()
    };

    if !is_json(&headers) {
        return bad_request("Content-Type must be application/json");
    }

    let data: Value = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => {
            log::error!("❌ Failed to parse JSON: {}", e);
            return bad_request("Invalid JSON format");
        }
    };

    let Some(foods) = data.get("foods") else {
        return bad_request("Request must include a \"foods\" list");
    };
    let Some(foods) = foods.as_array() else {
        return bad_request("Foods must be a list");
    };

    let processed = state.density.process_foods(foods).await;
    log::info!("✅ Processed densities for {} foods", processed.len());

    Json(json!({ "foods": processed })).into_response()
}
