//! Gift Records
//!
//! The persisted gift entity, its plan-tier envelope, and the store it
//! lives in. A record is created unpaid during checkout and flipped to
//! paid exactly once by a webhook-driven transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;

/// Opaque gift identifier (uuid v4), the recipient-facing correlation key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GiftId(String);

impl GiftId {
    /// Generate a new identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parse from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GiftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plan tiers
///
/// The tier fixes price and feature envelope at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Basic,
    Enhanced,
}

impl PlanTier {
    pub fn as_str(&self) -> &str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Enhanced => "enhanced",
        }
    }

    /// Maximum number of photos for this tier
    pub fn photo_limit(&self) -> usize {
        match self {
            PlanTier::Basic => 1,
            PlanTier::Enhanced => 3,
        }
    }

    /// Whether custom emoji/color personalization applies
    pub fn allows_personalization(&self) -> bool {
        matches!(self, PlanTier::Enhanced)
    }
}

impl Default for PlanTier {
    fn default() -> Self {
        PlanTier::Basic
    }
}

/// Envelope defaults applied outside the enhanced tier
pub const DEFAULT_EMOJI: &str = "\u{2764}\u{fe0f}";
pub const DEFAULT_TEXT_COLOR: &str = "#E11D48";
pub const DEFAULT_THEME: &str = "anniversary";

/// Input for creating a record, as submitted by the purchaser
///
/// Media must already be externalized to stable URLs before this point.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewGift {
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub clip_start: Option<u32>,
    #[serde(default)]
    pub clip_end: Option<u32>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub accent_emoji: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub customer_email: String,
}

impl NewGift {
    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(crate::error::PaymentError::Validation(
                "display_name is required".into(),
            ));
        }
        if self.media_urls.is_empty() {
            return Err(crate::error::PaymentError::Validation(
                "at least one media URL is required".into(),
            ));
        }
        Ok(())
    }
}

/// A gift record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GiftRecord {
    /// Primary identifier, assigned exactly once before persistence
    pub id: GiftId,

    /// Charge id assigned by the Pix provider, when paying by Pix
    pub billing_id: Option<String>,

    /// Monotonic: flips false -> true at most once
    pub is_paid: bool,

    /// Plan tier, immutable after creation
    pub plan: PlanTier,

    pub display_name: String,
    pub message: String,
    pub media_urls: Vec<String>,
    pub video_url: Option<String>,
    pub clip_start: u32,
    pub clip_end: u32,
    pub event_date: Option<String>,
    pub theme: String,
    pub accent_emoji: String,
    pub text_color: String,

    /// Purchaser contact, never exposed on the recipient read path
    pub customer_email: String,

    pub created_at: DateTime<Utc>,
}

impl GiftRecord {
    /// Create an unpaid record, normalizing the payload to the tier envelope
    ///
    /// Out-of-envelope personalization is reset to defaults and the photo
    /// list is truncated to the tier limit; client input is not trusted.
    pub fn new(input: NewGift, billing_id: Option<String>) -> Self {
        let mut media_urls = input.media_urls;
        media_urls.truncate(input.plan.photo_limit());

        let (accent_emoji, text_color) = if input.plan.allows_personalization() {
            (
                input.accent_emoji.unwrap_or_else(|| DEFAULT_EMOJI.into()),
                input.text_color.unwrap_or_else(|| DEFAULT_TEXT_COLOR.into()),
            )
        } else {
            (DEFAULT_EMOJI.into(), DEFAULT_TEXT_COLOR.into())
        };

        Self {
            id: GiftId::generate(),
            billing_id,
            is_paid: false,
            plan: input.plan,
            display_name: input.display_name,
            message: input.message,
            media_urls,
            video_url: input.video_url,
            clip_start: input.clip_start.unwrap_or(0),
            clip_end: input.clip_end.unwrap_or(0),
            event_date: input.event_date,
            theme: input.theme.unwrap_or_else(|| DEFAULT_THEME.into()),
            accent_emoji,
            text_color,
            customer_email: input.customer_email,
            created_at: Utc::now(),
        }
    }

    /// Recipient-facing projection while unpaid: id, paid flag, name only
    pub fn pending_view(&self) -> PendingStatus {
        PendingStatus {
            id: self.id.clone(),
            is_paid: false,
            display_name: self.display_name.clone(),
        }
    }

    /// Recipient-facing projection once paid: everything but the contact
    pub fn public_view(&self) -> PublicGift {
        PublicGift {
            id: self.id.clone(),
            is_paid: self.is_paid,
            plan: self.plan,
            display_name: self.display_name.clone(),
            message: self.message.clone(),
            media_urls: self.media_urls.clone(),
            video_url: self.video_url.clone(),
            clip_start: self.clip_start,
            clip_end: self.clip_end,
            event_date: self.event_date.clone(),
            theme: self.theme.clone(),
            accent_emoji: self.accent_emoji.clone(),
            text_color: self.text_color.clone(),
            created_at: self.created_at,
        }
    }
}

/// Partial projection returned for unpaid records
#[derive(Clone, Debug, Serialize)]
pub struct PendingStatus {
    pub id: GiftId,
    pub is_paid: bool,
    pub display_name: String,
}

/// Full projection returned for paid records, contact redacted
#[derive(Clone, Debug, Serialize)]
pub struct PublicGift {
    pub id: GiftId,
    pub is_paid: bool,
    pub plan: PlanTier,
    pub display_name: String,
    pub message: String,
    pub media_urls: Vec<String>,
    pub video_url: Option<String>,
    pub clip_start: u32,
    pub clip_end: u32,
    pub event_date: Option<String>,
    pub theme: String,
    pub accent_emoji: String,
    pub text_color: String,
    pub created_at: DateTime<Utc>,
}

/// Gift storage trait
///
/// An explicit store instance is injected into request handlers; there is
/// no module-level fallback.
#[async_trait]
pub trait GiftStore: Send + Sync {
    /// Persist a new record
    async fn create(&self, record: &GiftRecord) -> Result<()>;

    /// Get record by primary id
    async fn get(&self, id: &GiftId) -> Result<Option<GiftRecord>>;

    /// Get record by the Pix provider's charge id
    async fn get_by_billing_id(&self, billing_id: &str) -> Result<Option<GiftRecord>>;

    /// Idempotent mark-paid mutation
    ///
    /// Re-applying to an already-paid record leaves it paid and is not an
    /// error. Returns the updated record, `None` for an unknown id.
    async fn mark_paid(&self, id: &GiftId) -> Result<Option<GiftRecord>>;
}

/// In-memory gift store (dev/test fallback when no durable store is wired)
pub struct MemoryGiftStore {
    records: RwLock<HashMap<GiftId, GiftRecord>>,
    by_billing_id: RwLock<HashMap<String, GiftId>>,
}

impl Default for MemoryGiftStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGiftStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            by_billing_id: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl GiftStore for MemoryGiftStore {
    async fn create(&self, record: &GiftRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let mut by_billing = self.by_billing_id.write().unwrap();

        if let Some(ref billing_id) = record.billing_id {
            by_billing.insert(billing_id.clone(), record.id.clone());
        }
        records.insert(record.id.clone(), record.clone());

        Ok(())
    }

    async fn get(&self, id: &GiftId) -> Result<Option<GiftRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.get(id).cloned())
    }

    async fn get_by_billing_id(&self, billing_id: &str) -> Result<Option<GiftRecord>> {
        let by_billing = self.by_billing_id.read().unwrap();
        let records = self.records.read().unwrap();

        if let Some(id) = by_billing.get(billing_id) {
            Ok(records.get(id).cloned())
        } else {
            Ok(None)
        }
    }

    async fn mark_paid(&self, id: &GiftId) -> Result<Option<GiftRecord>> {
        let mut records = self.records.write().unwrap();

        if let Some(record) = records.get_mut(id) {
            record.is_paid = true;
            Ok(Some(record.clone()))
        } else {
            Ok(None)
        }
    }
}
