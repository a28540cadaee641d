//! Checkout Dispatch
//!
//! Creates the pending gift record and the provider payment artifact for
//! the selected payment method: a hosted redirect session for card, or a
//! scannable Pix charge for QR payment. The charged amount is a pure
//! function of the plan tier; no client-supplied amount is accepted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Currency,
};

use crate::error::{PaymentError, Result};
use crate::pix::{PixCharge, PixProvider};
use crate::record::{GiftId, GiftRecord, GiftStore, NewGift, PlanTier};

/// Fixed price table entry
#[derive(Clone, Debug)]
pub struct TierPricing {
    pub name: String,
    pub cents: i64,
}

impl PlanTier {
    /// Get pricing for this tier
    pub fn pricing(&self) -> TierPricing {
        match self {
            PlanTier::Basic => TierPricing {
                name: "Gift Page".into(),
                cents: 999,
            },
            PlanTier::Enhanced => TierPricing {
                name: "Gift Page Enhanced".into(),
                cents: 1999,
            },
        }
    }
}

/// Payment method selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Redirect-based hosted card checkout
    Card,
    /// Asynchronous Pix charge with QR code
    Pix,
}

/// A checkout order: method selection plus the full gift payload
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutOrder {
    pub method: PaymentMethod,
    #[serde(flatten)]
    pub gift: NewGift,
}

/// What the caller gets back from a successful dispatch
#[derive(Clone, Debug)]
pub enum CheckoutOutcome {
    /// Card: send the purchaser to the provider's hosted page
    Redirect { url: String },
    /// Pix: show the QR image and copyable code, then poll for payment
    PixCharge {
        gift_id: GiftId,
        billing_id: String,
        code: String,
        image: String,
    },
}

/// Redirect-session provider seam
///
/// The record id travels inside the session as opaque metadata and comes
/// back on the provider's completion webhook.
#[async_trait::async_trait]
pub trait CardProvider: Send + Sync {
    async fn create_session(
        &self,
        gift_id: &GiftId,
        display_name: &str,
        plan: PlanTier,
        public_url: &str,
    ) -> Result<String>;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }

    /// Get the webhook signing secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
}

#[async_trait::async_trait]
impl CardProvider for StripeClient {
    /// Create a hosted checkout session for a gift purchase
    ///
    /// One-time payment in BRL, record id embedded as session metadata.
    async fn create_session(
        &self,
        gift_id: &GiftId,
        display_name: &str,
        plan: PlanTier,
        public_url: &str,
    ) -> Result<String> {
        let pricing = plan.pricing();
        let success_url = format!("{public_url}/success?id={gift_id}");
        let cancel_url = format!("{public_url}/");
        let product_name = format!("{} - {display_name}", pricing.name);

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("gift_id".to_string(), gift_id.to_string());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::BRL,
                unit_amount: Some(pricing.cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: product_name,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        session
            .url
            .ok_or_else(|| PaymentError::Provider("no checkout URL returned".into()))
    }
}

/// Checkout dispatcher
///
/// Owns the store and the configured providers. Any provider or
/// persistence failure aborts the whole operation; a record orphaned by a
/// later provider failure simply stays unpaid.
pub struct Dispatcher {
    store: Arc<dyn GiftStore>,
    card: Option<Arc<dyn CardProvider>>,
    pix: Option<Arc<dyn PixProvider>>,
    public_url: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn GiftStore>,
        card: Option<Arc<dyn CardProvider>>,
        pix: Option<Arc<dyn PixProvider>>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            card,
            pix,
            public_url: public_url.into(),
        }
    }

    /// Run a checkout order end to end
    pub async fn checkout(&self, order: CheckoutOrder) -> Result<CheckoutOutcome> {
        order.gift.validate()?;

        match order.method {
            PaymentMethod::Pix => self.checkout_pix(order.gift).await,
            PaymentMethod::Card => self.checkout_card(order.gift).await,
        }
    }

    /// Pix: charge first, then persist with the provider's billing id
    async fn checkout_pix(&self, gift: NewGift) -> Result<CheckoutOutcome> {
        let pix = self
            .pix
            .as_ref()
            .ok_or_else(|| PaymentError::Config("Pix provider not configured".into()))?;

        let pricing = gift.plan.pricing();
        let description = format!("{} - {}", pricing.name, gift.display_name);

        let PixCharge {
            id: billing_id,
            br_code,
            br_code_image,
        } = pix.create_charge(pricing.cents, &description).await?;

        let record = GiftRecord::new(gift, Some(billing_id.clone()));
        self.store.create(&record).await?;

        tracing::info!(
            gift_id = %record.id,
            billing_id = %billing_id,
            plan = record.plan.as_str(),
            "created Pix charge"
        );

        Ok(CheckoutOutcome::PixCharge {
            gift_id: record.id,
            billing_id,
            code: br_code,
            image: br_code_image,
        })
    }

    /// Card: persist first so an id exists to embed as session metadata
    async fn checkout_card(&self, gift: NewGift) -> Result<CheckoutOutcome> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| PaymentError::Config("card provider not configured".into()))?;

        let record = GiftRecord::new(gift, None);
        self.store.create(&record).await?;

        let url = card
            .create_session(&record.id, &record.display_name, record.plan, &self.public_url)
            .await?;

        tracing::info!(
            gift_id = %record.id,
            plan = record.plan.as_str(),
            "created card checkout session"
        );

        Ok(CheckoutOutcome::Redirect { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryGiftStore;
    use std::sync::Mutex;

    struct FakeCard {
        fail: bool,
        seen: Mutex<Vec<(String, i64)>>,
    }

    #[async_trait::async_trait]
    impl CardProvider for FakeCard {
        async fn create_session(
            &self,
            gift_id: &GiftId,
            _display_name: &str,
            plan: PlanTier,
            public_url: &str,
        ) -> Result<String> {
            if self.fail {
                return Err(PaymentError::Provider("session create failed".into()));
            }
            self.seen
                .lock()
                .unwrap()
                .push((gift_id.to_string(), plan.pricing().cents));
            Ok(format!("{public_url}/pay/cs_test_1"))
        }
    }

    struct FakePix {
        fail: bool,
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl PixProvider for FakePix {
        async fn create_charge(&self, amount_cents: i64, _description: &str) -> Result<PixCharge> {
            if self.fail {
                return Err(PaymentError::Provider("charge create failed".into()));
            }
            self.seen.lock().unwrap().push(amount_cents);
            Ok(PixCharge {
                id: "pix_abc".into(),
                br_code: "00020126brcode".into(),
                br_code_image: "data:image/png;base64,AAAA".into(),
            })
        }
    }

    fn order(method: PaymentMethod, plan: PlanTier) -> CheckoutOrder {
        CheckoutOrder {
            method,
            gift: NewGift {
                plan,
                display_name: "Ana & Leo".into(),
                message: "hi".into(),
                media_urls: vec!["https://cdn.example.com/a.jpg".into()],
                customer_email: "buyer@example.com".into(),
                ..NewGift::default()
            },
        }
    }

    #[test]
    fn price_table_is_fixed_per_tier() {
        assert_eq!(PlanTier::Basic.pricing().cents, 999);
        assert_eq!(PlanTier::Enhanced.pricing().cents, 1999);
    }

    #[test]
    fn client_supplied_amount_is_not_part_of_the_contract() {
        // a forged amount field deserializes away; price comes from the tier
        let order: CheckoutOrder = serde_json::from_value(serde_json::json!({
            "method": "pix",
            "plan": "basic",
            "display_name": "Ana & Leo",
            "media_urls": ["https://cdn.example.com/a.jpg"],
            "customer_email": "buyer@example.com",
            "amount": 1
        }))
        .unwrap();
        assert_eq!(order.gift.plan.pricing().cents, 999);
    }

    #[tokio::test]
    async fn pix_checkout_charges_tier_price_and_persists_billing_id() {
        let store = Arc::new(MemoryGiftStore::new());
        let pix = Arc::new(FakePix {
            fail: false,
            seen: Mutex::new(vec![]),
        });
        let dispatcher = Dispatcher::new(store.clone(), None, Some(pix.clone()), "https://keepsake.test");

        let outcome = dispatcher
            .checkout(order(PaymentMethod::Pix, PlanTier::Basic))
            .await
            .unwrap();

        let CheckoutOutcome::PixCharge {
            gift_id,
            billing_id,
            code,
            image,
        } = outcome
        else {
            panic!("expected pix outcome");
        };
        assert_eq!(billing_id, "pix_abc");
        assert!(!code.is_empty());
        assert!(!image.is_empty());
        assert_eq!(*pix.seen.lock().unwrap(), vec![999]);

        let record = store.get(&gift_id).await.unwrap().unwrap();
        assert!(!record.is_paid);
        assert_eq!(record.billing_id.as_deref(), Some("pix_abc"));
    }

    #[tokio::test]
    async fn card_checkout_embeds_record_id_and_returns_redirect() {
        let store = Arc::new(MemoryGiftStore::new());
        let card = Arc::new(FakeCard {
            fail: false,
            seen: Mutex::new(vec![]),
        });
        let dispatcher = Dispatcher::new(store.clone(), Some(card.clone()), None, "https://keepsake.test");

        let outcome = dispatcher
            .checkout(order(PaymentMethod::Card, PlanTier::Enhanced))
            .await
            .unwrap();

        let CheckoutOutcome::Redirect { url } = outcome else {
            panic!("expected redirect outcome");
        };
        assert!(url.starts_with("https://keepsake.test"));

        let seen = card.seen.lock().unwrap();
        let (gift_id, cents) = &seen[0];
        assert_eq!(*cents, 1999);

        // the id handed to the provider is a real persisted record
        let record = store
            .get(&GiftId::from_string(gift_id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert!(!record.is_paid);
        assert!(record.billing_id.is_none());
    }

    #[tokio::test]
    async fn pix_provider_failure_creates_no_record() {
        let store = Arc::new(MemoryGiftStore::new());
        let pix = Arc::new(FakePix {
            fail: true,
            seen: Mutex::new(vec![]),
        });
        let dispatcher = Dispatcher::new(store.clone(), None, Some(pix), "https://keepsake.test");

        let err = dispatcher
            .checkout(order(PaymentMethod::Pix, PlanTier::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Provider(_)));
        assert!(store.get_by_billing_id("pix_abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn card_provider_failure_leaves_orphan_unpaid_record() {
        let store = Arc::new(MemoryGiftStore::new());
        let card = Arc::new(FakeCard {
            fail: true,
            seen: Mutex::new(vec![]),
        });
        let dispatcher = Dispatcher::new(store.clone(), Some(card), None, "https://keepsake.test");

        let err = dispatcher
            .checkout(order(PaymentMethod::Card, PlanTier::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Provider(_)));
    }

    #[tokio::test]
    async fn paid_round_trip_reveals_full_payload() {
        let store = Arc::new(MemoryGiftStore::new());
        let pix = Arc::new(FakePix {
            fail: false,
            seen: Mutex::new(vec![]),
        });
        let dispatcher = Dispatcher::new(store.clone(), None, Some(pix), "https://keepsake.test");

        let outcome = dispatcher
            .checkout(order(PaymentMethod::Pix, PlanTier::Enhanced))
            .await
            .unwrap();
        let CheckoutOutcome::PixCharge {
            gift_id,
            billing_id,
            ..
        } = outcome
        else {
            panic!("expected pix outcome");
        };

        let processor = crate::webhook::WebhookProcessor::new(store.clone());
        let raw = serde_json::json!({
            "event": "billing.paid",
            "data": { "pixQrCode": { "id": billing_id } }
        })
        .to_string();
        processor.process_pix_event(&raw).await.unwrap();

        let record = store.get(&gift_id).await.unwrap().unwrap();
        assert!(record.is_paid);

        let json = serde_json::to_value(record.public_view()).unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["media_urls"][0], "https://cdn.example.com/a.jpg");
        assert!(json.get("customer_email").is_none());
    }

    #[tokio::test]
    async fn unconfigured_method_is_a_config_error() {
        let store = Arc::new(MemoryGiftStore::new());
        let dispatcher = Dispatcher::new(store, None, None, "https://keepsake.test");

        let err = dispatcher
            .checkout(order(PaymentMethod::Pix, PlanTier::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_a_provider() {
        let store = Arc::new(MemoryGiftStore::new());
        let pix = Arc::new(FakePix {
            fail: false,
            seen: Mutex::new(vec![]),
        });
        let dispatcher = Dispatcher::new(store, None, Some(pix.clone()), "https://keepsake.test");

        let mut bad = order(PaymentMethod::Pix, PlanTier::Basic);
        bad.gift.media_urls.clear();

        let err = dispatcher.checkout(bad).await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert!(pix.seen.lock().unwrap().is_empty());
    }
}
