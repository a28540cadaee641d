//! Application State

use std::sync::Arc;

use keepsake_payments::{
    Dispatcher, GiftStore, MediaStore, PixGateway, StripeClient, WebhookProcessor,
};

/// Shared application state
///
/// The store is an explicit injected instance; handlers never reach for a
/// process-global.
#[derive(Clone)]
pub struct AppState {
    /// Gift record store
    pub store: Arc<dyn GiftStore>,

    /// Media externalization seam (object storage in production)
    pub media: Arc<dyn MediaStore>,

    /// Checkout dispatcher over the configured providers
    pub dispatcher: Arc<Dispatcher>,

    /// Webhook correlation and mark-paid processor
    pub webhooks: Arc<WebhookProcessor>,

    /// Card provider client (None if not configured)
    pub stripe: Option<Arc<StripeClient>>,

    /// Pix provider client (None if not configured)
    pub pix: Option<Arc<PixGateway>>,
}
