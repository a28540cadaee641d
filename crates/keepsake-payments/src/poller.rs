//! Payment Status Poller
//!
//! The purchaser-side fallback for observing the paid flip: re-query the
//! status endpoint on a fixed interval until the first observed
//! `is_paid=true`, then stop. Transient fetch failures are swallowed and
//! retried on the next tick; cancellation is a watch channel bound to the
//! view's lifetime. The only ordering guarantee is "stop after first
//! observed true".

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::{PaymentError, Result};
use crate::record::GiftId;

/// Effective interval used by the purchaser-facing waiting view
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(3);

/// One observation of the gift's paid state
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn is_paid(&self) -> Result<bool>;
}

/// Probe backed by the HTTP status endpoint
pub struct HttpStatusProbe {
    http: reqwest::Client,
    url: String,
}

impl HttpStatusProbe {
    pub fn new(public_url: &str, gift_id: &GiftId) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{public_url}/api/gift?id={gift_id}"),
        }
    }
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(default)]
    is_paid: bool,
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn is_paid(&self) -> Result<bool> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(self.url.clone()));
        }

        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        Ok(body.is_paid)
    }
}

/// Poll until the first observed paid state or cancellation
///
/// Returns `true` when the flip was observed, `false` when cancelled (the
/// sender signalled or went away). No timeout is applied here; an unpaid
/// record polls indefinitely while the view is alive.
pub async fn poll_until_paid(
    probe: &dyn StatusProbe,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) -> bool {
    if *cancel.borrow() {
        return false;
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match probe.is_paid().await {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "status probe failed; retrying next tick");
                    }
                }
            }
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct SeqProbe {
        responses: Mutex<VecDeque<Result<bool>>>,
        calls: Mutex<usize>,
    }

    impl SeqProbe {
        fn new(responses: Vec<Result<bool>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StatusProbe for SeqProbe {
        async fn is_paid(&self) -> Result<bool> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(false))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_observed_paid() {
        let probe = SeqProbe::new(vec![Ok(false), Ok(false), Ok(true)]);
        let (_tx, rx) = watch::channel(false);

        assert!(poll_until_paid(&probe, Duration::from_secs(3), rx).await);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_probe_errors_are_retried() {
        let probe = SeqProbe::new(vec![
            Err(PaymentError::Provider("connection reset".into())),
            Ok(true),
        ]);
        let (_tx, rx) = watch::channel(false);

        assert!(poll_until_paid(&probe, Duration::from_secs(3), rx).await);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_never_probes() {
        let probe = SeqProbe::new(vec![Ok(true)]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        assert!(!poll_until_paid(&probe, Duration::from_secs(3), rx).await);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_an_unpaid_poll() {
        let probe = SeqProbe::new(vec![]);
        let (tx, rx) = watch::channel(false);

        let (observed, ()) = tokio::join!(
            poll_until_paid(&probe, Duration::from_secs(3), rx),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                let _ = tx.send(true);
            }
        );

        assert!(!observed);
    }
}
