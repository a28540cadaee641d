//! Webhook Processing
//!
//! Each provider delivery walks a small state machine:
//! received -> authenticated -> correlated -> applied, terminating early as
//! rejected (bad signature/secret) or uncorrelated (no matching record).
//! The only side effect is the idempotent mark-paid mutation, so provider
//! redeliveries and near-simultaneous confirmations are safe.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PaymentError, Result};
use crate::record::{GiftId, GiftRecord, GiftStore};

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance, seconds
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify the card provider's webhook signature over the raw body
///
/// Header format `t=<unix>,v1=<hex hmac>`; the MAC covers
/// `"{t}.{raw body}"` with the signing secret. Runs before any business
/// field is parsed. Comparison goes through `Mac::verify_slice`, which is
/// constant-time.
pub fn verify_card_signature(payload: &[u8], signature_header: &str, secret: &str) -> Result<()> {
    let parts: HashMap<&str, &str> = signature_header
        .split(',')
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            Some((split.next()?, split.next()?))
        })
        .collect();

    let timestamp = parts
        .get("t")
        .ok_or_else(|| PaymentError::WebhookAuth("missing timestamp".into()))?;
    let expected = parts
        .get("v1")
        .ok_or_else(|| PaymentError::WebhookAuth("missing signature".into()))?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::WebhookAuth("invalid timestamp".into()))?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::WebhookAuth("timestamp outside tolerance".into()));
    }

    let expected_bytes = hex::decode(expected)
        .map_err(|_| PaymentError::WebhookAuth("signature is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::WebhookAuth("invalid signing secret".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&expected_bytes)
        .map_err(|_| PaymentError::WebhookAuth("signature mismatch".into()))
}

/// Terminal states of a processed delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment confirmation applied (or re-applied, which is a no-op)
    Applied { gift_id: GiftId },
    /// Event type is not a payment confirmation; acknowledged and dropped
    Ignored { event_type: String },
    /// Confirmation that matches no record; acknowledged so the provider
    /// stops redelivering something we can never resolve
    Uncorrelated,
}

/// Card provider event envelope
#[derive(Debug, Deserialize)]
pub struct CardEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: CardEventData,
}

#[derive(Debug, Deserialize)]
pub struct CardEventData {
    pub object: serde_json::Value,
}

/// The slice of a checkout session we care about
#[derive(Debug, Default, Deserialize)]
struct CardSessionObject {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Pix provider event envelope
///
/// Unknown shapes decode to an empty `data` rather than failing, so a
/// malformed or unexpected delivery ends as uncorrelated, not a 500.
#[derive(Debug, Deserialize)]
pub struct PixEvent {
    pub event: String,
    #[serde(default)]
    pub data: PixEventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct PixEventData {
    #[serde(rename = "pixQrCode", default)]
    pub pix_qr_code: Option<PixChargeRef>,
}

#[derive(Debug, Deserialize)]
pub struct PixChargeRef {
    pub id: String,
}

/// Event type that confirms a card payment
const CARD_PAID_EVENT: &str = "checkout.session.completed";
/// Event type that confirms a Pix payment
const PIX_PAID_EVENT: &str = "billing.paid";

/// Correlation strategy: find the record a confirmation refers to
///
/// One implementation per provider, selected by which webhook path the
/// event arrived on.
#[async_trait::async_trait]
pub trait Correlation: Send + Sync {
    async fn resolve(&self, store: &dyn GiftStore, key: &str) -> Result<Option<GiftRecord>>;
}

/// Card sessions carry the record id itself as metadata
pub struct DirectIdLookup;

#[async_trait::async_trait]
impl Correlation for DirectIdLookup {
    async fn resolve(&self, store: &dyn GiftStore, key: &str) -> Result<Option<GiftRecord>> {
        store.get(&GiftId::from_string(key)).await
    }
}

/// Pix events carry the provider's billing id, resolved via the secondary
/// index
pub struct BillingIdLookup;

#[async_trait::async_trait]
impl Correlation for BillingIdLookup {
    async fn resolve(&self, store: &dyn GiftStore, key: &str) -> Result<Option<GiftRecord>> {
        store.get_by_billing_id(key).await
    }
}

/// Webhook processor
pub struct WebhookProcessor {
    store: Arc<dyn GiftStore>,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn GiftStore>) -> Self {
        Self { store }
    }

    /// Process an authenticated card provider delivery
    pub async fn process_card_event(&self, raw: &str) -> Result<WebhookOutcome> {
        let event: CardEvent = serde_json::from_str(raw)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        tracing::info!(event_id = %event.id, event_type = %event.event_type, "card webhook received");

        if event.event_type != CARD_PAID_EVENT {
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let session: CardSessionObject =
            serde_json::from_value(event.data.object).unwrap_or_default();

        match session.metadata.get("gift_id") {
            Some(gift_id) => self.apply(&DirectIdLookup, gift_id).await,
            None => {
                tracing::warn!(event_id = %event.id, "completed session without gift metadata");
                Ok(WebhookOutcome::Uncorrelated)
            }
        }
    }

    /// Process an authenticated Pix provider delivery
    pub async fn process_pix_event(&self, raw: &str) -> Result<WebhookOutcome> {
        // Decode failures end as uncorrelated: redelivery cannot fix a shape
        // this system does not understand.
        let Ok(event) = serde_json::from_str::<PixEvent>(raw) else {
            tracing::warn!("undecodable Pix webhook body");
            return Ok(WebhookOutcome::Uncorrelated);
        };

        tracing::info!(event_type = %event.event, "Pix webhook received");

        if event.event != PIX_PAID_EVENT {
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event,
            });
        }

        match event.data.pix_qr_code {
            Some(charge) => self.apply(&BillingIdLookup, &charge.id).await,
            None => {
                tracing::warn!("paid event without a billing id");
                Ok(WebhookOutcome::Uncorrelated)
            }
        }
    }

    /// Correlate and apply the mark-paid transition
    async fn apply(&self, strategy: &dyn Correlation, key: &str) -> Result<WebhookOutcome> {
        let Some(record) = strategy.resolve(self.store.as_ref(), key).await? else {
            tracing::warn!(key, "payment confirmation matches no record");
            return Ok(WebhookOutcome::Uncorrelated);
        };

        self.store.mark_paid(&record.id).await?;
        tracing::info!(gift_id = %record.id, "gift marked paid");

        Ok(WebhookOutcome::Applied { gift_id: record.id })
    }
}
