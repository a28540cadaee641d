//! Pix Charge Gateway
//!
//! REST client for the asynchronous QR payment provider. A charge returns
//! the provider's billing id plus a scannable code image and a copyable
//! code string; payment confirmation arrives later on the webhook.

use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Async-QR provider seam
#[async_trait::async_trait]
pub trait PixProvider: Send + Sync {
    async fn create_charge(&self, amount_cents: i64, description: &str) -> Result<PixCharge>;
}

/// A created Pix charge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PixCharge {
    /// Provider-assigned billing id, stored as the secondary correlation key
    pub id: String,

    /// Copyable code string
    #[serde(rename = "brCode")]
    pub br_code: String,

    /// Scannable code image (base64 data URL)
    #[serde(rename = "brCodeBase64")]
    pub br_code_image: String,
}

#[derive(Serialize)]
struct CreateChargeRequest<'a> {
    amount: i64,
    #[serde(rename = "expiresIn")]
    expires_in: u64,
    description: &'a str,
}

#[derive(Deserialize)]
struct CreateChargeResponse {
    #[serde(default)]
    data: Option<PixCharge>,
    #[serde(default)]
    error: Option<String>,
}

/// Charge lifetime before the provider expires it, in seconds
const CHARGE_EXPIRY_SECS: u64 = 3600;

/// Pix provider client
pub struct PixGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    webhook_secret: String,
}

impl PixGateway {
    /// Create a new Pix gateway
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PIX_API_URL")
            .unwrap_or_else(|_| "https://api.abacatepay.com/v1".into());
        let api_key = std::env::var("PIX_API_KEY")
            .map_err(|_| PaymentError::Config("PIX_API_KEY not set".into()))?;
        let webhook_secret = std::env::var("PIX_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("PIX_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(base_url, api_key, webhook_secret))
    }

    /// Get the webhook shared secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
}

#[async_trait::async_trait]
impl PixProvider for PixGateway {
    async fn create_charge(&self, amount_cents: i64, description: &str) -> Result<PixCharge> {
        let response = self
            .http
            .post(format!("{}/pixQrCode/create", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CreateChargeRequest {
                amount: amount_cents,
                expires_in: CHARGE_EXPIRY_SECS,
                description,
            })
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        let status = response.status();
        let body: CreateChargeResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if !status.is_success() {
            let reason = body.error.unwrap_or_else(|| status.to_string());
            return Err(PaymentError::Provider(reason));
        }

        body.data
            .ok_or_else(|| PaymentError::Provider("charge response missing data".into()))
    }
}
