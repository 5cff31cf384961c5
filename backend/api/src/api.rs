//! Axum REST API: router construction and handlers.

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::assets::{encode_upload_file, AssetStore, ResourceType, UploadRequest};
use crate::chat::{ChatService, ChatTurn, TreePersona};
use crate::config::Config;
use crate::enrichment::{TreeEnricher, TreeFacts};
use crate::errors::{ApiError, ErrorResponse, Result, VendorError};
use crate::payments::{to_minor_units, NewPaymentIntent, PaymentGateway};

/// Request bodies above this size are rejected before reaching a handler.
pub const BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub payments: Arc<dyn PaymentGateway>,
    pub assets: Arc<dyn AssetStore>,
    pub chat: ChatService,
    pub enricher: TreeEnricher,
}

pub fn router(state: Arc<ApiState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/api/debug", get(debug_info))
        .route("/api/create-payment-intent", post(create_payment_intent))
        .route("/api/upload", post(upload))
        .route("/api/delete", post(delete_asset))
        .route("/api/chat", post(chat))
        .route("/api/trees/enrich", post(enrich_tree))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Last-resort handler: a panicking request becomes a JSON 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Internal server error".to_string()
    };
    error!("Request handler panicked: {message}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::message(message)),
    )
        .into_response()
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub data: Option<Value>,
    #[serde(default)]
    pub resource_type: ResourceType,
    pub upload_preset: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub public_id: Option<String>,
    #[serde(default)]
    pub resource_type: ResourceType,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: Option<String>,
    pub tree: TreePersona,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
pub struct EnrichBody {
    pub species: Option<String>,
    pub location: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub timestamp: String,
}

/// Trimmed, non-empty string or a 400.
fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{field} is required")))
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.as_str(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /api/debug`
///
/// Which integrations are configured, never their secrets. Hidden in production.
pub async fn debug_info(State(state): State<Arc<ApiState>>) -> Result<Json<Value>> {
    let config = &state.config;
    if config.environment.is_production() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({
        "environment": config.environment.as_str(),
        "stripe": { "secret_key_configured": config.stripe_secret_key.is_some() },
        "cloudinary": {
            "configured": config.cloudinary.is_complete(),
            "cloud_name": config.cloudinary.cloud_name,
            "api_key_configured": config.cloudinary.api_key.is_some(),
            "api_secret_configured": config.cloudinary.api_secret.is_some(),
            "upload_preset": config.cloudinary.upload_preset,
        },
        "ai": {
            "provider": config.ai.provider.map(|p| p.as_str()),
            "api_key_configured": config.ai.api_key().is_some(),
            "primary_model": config.ai.primary_model,
            "fallback_model": config.ai.fallback_model,
        },
        "cors_origins": config.cors_origins,
        "missing": config.missing_secrets(),
    })))
}

/// `POST /api/create-payment-intent`
///
/// Converts rupees to paise and opens a card PaymentIntent in INR.
pub async fn create_payment_intent(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<CreatePaymentIntentRequest>, JsonRejection>,
) -> Result<Json<CreatePaymentIntentResponse>> {
    let Json(req) = payload?;
    let amount = to_minor_units(req.amount)
        .ok_or_else(|| ApiError::Validation("Invalid amount".into()))?;

    let intent = state
        .payments
        .create_payment_intent(&NewPaymentIntent::inr(amount))
        .await?;
    let client_secret = intent.client_secret.ok_or_else(|| {
        VendorError::new("Stripe did not return a client secret").with_kind("api_error")
    })?;

    info!("Created PaymentIntent {} for {} paise", intent.id, amount);
    Ok(Json(CreatePaymentIntentResponse {
        client_secret,
        payment_intent_id: intent.id,
    }))
}

/// `POST /api/upload`
pub async fn upload(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<UploadBody>, JsonRejection>,
) -> Result<Json<UploadResponse>> {
    let Json(body) = payload?;
    let data = body
        .data
        .filter(|d| !d.is_null())
        .ok_or_else(|| ApiError::Validation("No data provided".into()))?;
    let file = encode_upload_file(&data, body.resource_type)?;

    let asset = state
        .assets
        .upload(&UploadRequest {
            file,
            resource_type: body.resource_type,
            upload_preset: body.upload_preset.filter(|p| !p.trim().is_empty()),
        })
        .await?;

    info!(
        "Uploaded {} asset {}",
        body.resource_type.as_str(),
        asset.public_id
    );
    Ok(Json(UploadResponse {
        success: true,
        url: asset.url,
        public_id: asset.public_id,
    }))
}

/// `POST /api/delete`
///
/// Anything other than an `ok` result from Cloudinary, including
/// `not found`, is reported as a failure.
pub async fn delete_asset(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<DeleteBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = payload?;
    let public_id = required(body.public_id, "public_id")?;

    let result = state.assets.destroy(&public_id, body.resource_type).await?;
    if result != "ok" {
        return Err(ApiError::AssetNotDeleted(result));
    }

    info!("Deleted {} asset {public_id}", body.resource_type.as_str());
    Ok(Json(json!({ "success": true, "result": result })))
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = payload?;
    let message = required(body.message, "message")?;

    let reply = state
        .chat
        .respond(&body.tree, &body.history, &message)
        .await
        .map_err(VendorError::from)?;
    Ok(Json(json!(reply)))
}

/// `POST /api/trees/enrich`
pub async fn enrich_tree(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<EnrichBody>, JsonRejection>,
) -> Result<Json<TreeFacts>> {
    let Json(body) = payload?;
    let species = required(body.species, "species")?;
    let location = body.location.filter(|l| !l.trim().is_empty());

    let facts = state
        .enricher
        .enrich(&species, location.as_deref())
        .await;
    Ok(Json(facts))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
