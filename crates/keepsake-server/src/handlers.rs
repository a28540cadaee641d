//! HTTP Handlers

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use keepsake_payments::{
    CheckoutOrder, CheckoutOutcome, GiftId, GiftRecord, NewGift, PaymentError,
    verify_card_signature,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub pix_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Uniform checkout envelope: always HTTP 200, `success` tells the story
#[derive(Debug, Default, Serialize)]
pub struct CheckoutReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckoutReply {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PixHookParams {
    #[serde(rename = "webhookSecret", default)]
    pub webhook_secret: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe.is_some(),
        pix_configured: state.pix.is_some(),
    })
}

/// Run a checkout order
///
/// Media is externalized through the upload seam before any record exists;
/// every failure collapses into the same `{success:false, error}` shape.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(mut order): Json<CheckoutOrder>,
) -> Json<CheckoutReply> {
    for (i, url) in order.gift.media_urls.iter_mut().enumerate() {
        match state.media.externalize(url, &format!("gift-{i}")).await {
            Ok(stable) => *url = stable,
            Err(e) => {
                tracing::warn!(error = %e, "media externalization failed");
                return Json(CheckoutReply::failure(e.user_message()));
            }
        }
    }

    match state.dispatcher.checkout(order).await {
        Ok(CheckoutOutcome::Redirect { url }) => Json(CheckoutReply {
            success: true,
            url: Some(url),
            ..CheckoutReply::default()
        }),
        Ok(CheckoutOutcome::PixCharge {
            gift_id,
            billing_id,
            code,
            image,
        }) => Json(CheckoutReply {
            success: true,
            gift_id: Some(gift_id.to_string()),
            billing_id: Some(billing_id),
            pix_code: Some(code),
            pix_image: Some(image),
            ..CheckoutReply::default()
        }),
        Err(e) => {
            tracing::error!(error = %e, "checkout failed");
            Json(CheckoutReply::failure(e.user_message()))
        }
    }
}

/// Create an unpaid gift record directly
pub async fn create_gift(
    State(state): State<AppState>,
    Json(input): Json<NewGift>,
) -> Result<Json<GiftRecord>, (StatusCode, Json<ErrorResponse>)> {
    input.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.user_message().into(),
            }),
        )
    })?;

    let record = GiftRecord::new(input, None);
    state.store.create(&record).await.map_err(|e| {
        tracing::error!(error = %e, "failed to persist gift");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "failed to save gift".into(),
            }),
        )
    })?;

    Ok(Json(record))
}

/// Read the current gift state
///
/// Unpaid records answer with the partial projection only; content stays
/// hidden from anyone holding the link early. Paid records answer with the
/// full payload minus the purchaser contact, redacted on every read.
pub async fn gift_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Response {
    let Some(id) = params.id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "missing id".into(),
            }),
        )
            .into_response();
    };

    match state.store.get(&GiftId::from_string(id)).await {
        Ok(Some(record)) if record.is_paid => Json(record.public_view()).into_response(),
        Ok(Some(record)) => Json(record.pending_view()).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not found".into(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "status read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".into(),
                }),
            )
                .into_response()
        }
    }
}

/// Pix webhook health probe
pub async fn pix_webhook_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "active" }))
}

/// Pix payment webhook
///
/// Shared-secret gate first, then decode. Everything past authentication
/// acknowledges 200 so the provider stops redelivering events this system
/// can never resolve.
pub async fn pix_webhook(
    State(state): State<AppState>,
    Query(params): Query<PixHookParams>,
    body: String,
) -> Response {
    let Some(pix) = state.pix.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Pix payments not configured".into(),
            }),
        )
            .into_response();
    };

    if params.webhook_secret.as_deref() != Some(pix.webhook_secret()) {
        tracing::warn!("Pix webhook with bad or missing secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "unauthorized".into(),
            }),
        )
            .into_response();
    }

    match state.webhooks.process_pix_event(&body).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Pix webhook handled");
            Json(serde_json::json!({ "received": true })).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Pix webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".into(),
                }),
            )
                .into_response()
        }
    }
}

/// Card provider webhook
///
/// Signature verification runs over the raw body before any business field
/// is parsed; a bad signature is the one case that must reject.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(stripe) = state.stripe.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "card payments not configured".into(),
            }),
        )
            .into_response();
    };

    let Some(signature) = headers.get("stripe-signature").and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "missing signature".into(),
            }),
        )
            .into_response();
    };

    if let Err(e) = verify_card_signature(body.as_bytes(), signature, stripe.webhook_secret()) {
        tracing::warn!(error = %e, "card webhook signature rejected");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid signature".into(),
            }),
        )
            .into_response();
    }

    match state.webhooks.process_card_event(&body).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "card webhook handled");
            Json(serde_json::json!({ "received": true })).into_response()
        }
        Err(PaymentError::WebhookParse(e)) => {
            tracing::warn!(error = %e, "undecodable card webhook body");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid event".into(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "card webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".into(),
                }),
            )
                .into_response()
        }
    }
}
