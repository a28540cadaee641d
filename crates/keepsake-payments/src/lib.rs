//! # keepsake-payments
//!
//! Payment-to-fulfillment core for keepsake gift pages: the record
//! lifecycle, dual-provider checkout dispatch, webhook correlation, and
//! the purchaser-side status poller.
//!
//! ## Flow
//!
//! ```text
//! ┌───────────┐  create record   ┌────────────┐  paid event   ┌───────────┐
//! │ Dispatcher│─────────────────▶│  GiftStore │◀──────────────│  Webhook  │
//! │ (card/Pix)│  (unpaid)        │            │  mark_paid    │ Processor │
//! └───────────┘                  └────────────┘               └───────────┘
//!                                      ▲
//!                                      │ is_paid?
//!                                ┌───────────┐
//!                                │  Poller   │  reveals the page on the
//!                                └───────────┘  first observed flip
//! ```
//!
//! Two providers, two correlation keys:
//!
//! - **Card** (hosted redirect session): the record id is embedded in the
//!   session as metadata and comes back on the completion webhook, verified
//!   with an HMAC signature over the raw body.
//! - **Pix** (asynchronous QR charge): the provider assigns a billing id at
//!   charge creation, stored on the record and resolved via a secondary
//!   lookup when the paid webhook arrives, authenticated by a shared-secret
//!   query parameter.
//!
//! Both paths converge on the same idempotent mark-paid mutation, which is
//! the sole concurrency-correctness mechanism: redeliveries and duplicate
//! confirmations re-apply a no-op.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keepsake_payments::{
//!     CheckoutOrder, Dispatcher, MemoryGiftStore, PaymentMethod, WebhookProcessor,
//! };
//!
//! let store = Arc::new(MemoryGiftStore::new());
//! let dispatcher = Dispatcher::new(store.clone(), card, pix, "https://keepsake.example");
//!
//! let outcome = dispatcher.checkout(order).await?;
//! // Pix: show outcome's QR image + code, then poll /api/gift?id=...
//! // Card: redirect the purchaser to outcome's URL
//! ```

mod checkout;
mod error;
mod media;
mod pix;
mod poller;
mod record;
mod webhook;

pub use checkout::{
    CardProvider, CheckoutOrder, CheckoutOutcome, Dispatcher, PaymentMethod, StripeClient,
    TierPricing,
};
pub use error::{PaymentError, Result};
pub use media::{MediaStore, PassthroughMedia};
pub use pix::{PixCharge, PixGateway, PixProvider};
pub use poller::{DEFAULT_POLL_PERIOD, HttpStatusProbe, StatusProbe, poll_until_paid};
pub use record::{
    GiftId, GiftRecord, GiftStore, MemoryGiftStore, NewGift, PendingStatus, PlanTier, PublicGift,
};
pub use webhook::{
    BillingIdLookup, CardEvent, Correlation, DirectIdLookup, PixEvent, WebhookOutcome,
    WebhookProcessor, verify_card_signature,
};
