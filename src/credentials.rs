//! Client-credentials access token kept fresh in memory.
//!
//! [`Refresher::renew`] fetches a token and publishes the deadline of the next
//! attempt; the task started by [`Refresher::spawn`] sleeps until whatever
//! deadline was published last. Renewal attempts are serialized, so there is
//! only ever one pending deadline and one attempt in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::UpstreamError;

/// How long before expiry a token is renewed.
pub const RENEWAL_MARGIN: Duration = Duration::from_secs(60);

/// Delay before retrying a failed renewal.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl Credential {
    pub fn renewal_delay(&self) -> Duration {
        Duration::from_secs(self.expires_in).saturating_sub(RENEWAL_MARGIN)
    }
}

/// Shared holder of the current credential.
#[derive(Clone, Default)]
pub struct CredentialCell {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl CredentialCell {
    pub async fn current(&self) -> Option<Credential> {
        self.inner.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|c| c.access_token.clone())
    }

    async fn replace(&self, credential: Credential) {
        *self.inner.write().await = Some(credential);
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<Credential, UpstreamError>;
}

pub struct Refresher {
    provider: Arc<dyn TokenProvider>,
    credentials: CredentialCell,
    in_flight: Mutex<()>,
    next_renewal: watch::Sender<Instant>,
}

impl Refresher {
    pub fn new(provider: Arc<dyn TokenProvider>, credentials: CredentialCell) -> Self {
        let (next_renewal, _) = watch::channel(Instant::now());
        Self {
            provider,
            credentials,
            in_flight: Mutex::new(()),
            next_renewal,
        }
    }

    pub fn credentials(&self) -> &CredentialCell {
        &self.credentials
    }

    /// When the renewal task will next fetch a token.
    pub fn next_renewal(&self) -> Instant {
        *self.next_renewal.borrow()
    }

    /// Fetches a fresh token, stores it on success and reschedules the next
    /// attempt either way.
    pub async fn renew(&self) -> Result<Credential, UpstreamError> {
        let _guard = self.in_flight.lock().await;

        match self.provider.fetch_token().await {
            Ok(credential) => {
                let delay = credential.renewal_delay();
                self.credentials.replace(credential.clone()).await;
                self.next_renewal.send_replace(Instant::now() + delay);
                info!("Access token renewed, next renewal in {}s", delay.as_secs());
                Ok(credential)
            }
            Err(e) => {
                self.next_renewal.send_replace(Instant::now() + RETRY_INTERVAL);
                error!("Failed to obtain access token: {}, retrying in {}s", e, RETRY_INTERVAL.as_secs());
                Err(e)
            }
        }
    }

    /// Starts the renewal loop. The first attempt runs immediately.
    pub fn spawn(self: &Arc<Self>) -> RefreshTask {
        let refresher = Arc::clone(self);
        let mut schedule = self.next_renewal.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let deadline = *schedule.borrow_and_update();
                tokio::select! {
                    _ = time::sleep_until(deadline) => {
                        // failures are logged and rescheduled by renew
                        let _ = refresher.renew().await;
                    }
                    changed = schedule.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        RefreshTask { handle }
    }
}

pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}
