//! Media Externalization Boundary
//!
//! Records only ever hold stable public URLs. The real object-storage
//! uploader lives behind this seam; the passthrough implementation accepts
//! media that is already externally hosted and rejects inline payloads.

use async_trait::async_trait;

use crate::error::{PaymentError, Result};

/// Turns an inbound image payload into a stable public URL
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn externalize(&self, source: &str, name_hint: &str) -> Result<String>;
}

/// Accepts already-hosted URLs as-is
pub struct PassthroughMedia;

#[async_trait]
impl MediaStore for PassthroughMedia {
    async fn externalize(&self, source: &str, _name_hint: &str) -> Result<String> {
        if source.starts_with("https://") || source.starts_with("http://") {
            Ok(source.to_string())
        } else {
            Err(PaymentError::Validation(
                "media must be an externally hosted URL".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hosted_urls_pass_through() {
        let url = PassthroughMedia
            .externalize("https://cdn.example.com/a.jpg", "gift-0")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/a.jpg");
    }

    #[tokio::test]
    async fn inline_payloads_are_rejected() {
        let err = PassthroughMedia
            .externalize("data:image/png;base64,AAAA", "gift-0")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }
}
