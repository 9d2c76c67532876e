//! External Identity Sync Dispatcher
//!
//! Best-effort, at-most-once notification of the dependent service when a
//! new account is created. Dispatch detaches from the request so the sync
//! target can never block or fail registration; failures are logged and
//! dropped, never retried here (reconciliation is the dependent service's
//! job).

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use reqwest::Client as HttpClient;
use serde::Serialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::env;
use crate::models::user::UserRole;

const SYNC_PATH: &str = "/internal/identity/users/sync";

/// Configuration for the identity sync dispatcher
#[derive(Debug, Clone)]
pub struct IdentitySyncConfig {
    /// Master switch; when false the dispatcher is a no-op
    pub enabled: bool,
    /// Base URL of the dependent service
    pub base_url: String,
    /// Bearer token for the internal endpoint
    pub token: String,
    /// User-Agent header on sync requests
    pub user_agent: String,
    /// Per-dispatch timeout, independent of the request deadline
    pub timeout: Duration,
    /// Upper bound on concurrently in-flight dispatches
    pub max_in_flight: usize,
}

impl IdentitySyncConfig {
    /// Load dispatcher configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::get_bool("IDENTITY_SYNC_ENABLED", false),
            base_url: env::get_string("IDENTITY_SYNC_BASE_URL", ""),
            token: env::get_string("IDENTITY_SYNC_TOKEN", ""),
            user_agent: env::get_string("IDENTITY_SYNC_USER_AGENT", "mwork-auth"),
            timeout: Duration::from_secs(env::get_u64("IDENTITY_SYNC_TIMEOUT_SECONDS", 10)),
            max_in_flight: env::get_usize("IDENTITY_SYNC_MAX_IN_FLIGHT", 32),
        }
    }
}

/// Payload sent to the dependent service for a new account
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySyncPayload {
    pub mwork_user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

/// Fire-and-forget notifier for newly created accounts
#[derive(Clone)]
pub struct IdentitySyncDispatcher {
    client: Option<HttpClient>,
    config: Arc<IdentitySyncConfig>,
    permits: Arc<Semaphore>,
}

impl IdentitySyncDispatcher {
    /// Build a dispatcher from configuration.
    ///
    /// When sync is disabled or the base URL is missing, the dispatcher is
    /// constructed without a client and every dispatch is a no-op.
    pub fn new(config: IdentitySyncConfig) -> Self {
        let client = if config.enabled && !config.base_url.is_empty() {
            HttpClient::builder()
                .timeout(config.timeout)
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| {
                    error!("failed to build identity sync HTTP client: {}", e);
                    e
                })
                .ok()
        } else {
            None
        };

        let max_in_flight = config.max_in_flight.max(1);

        Self {
            client,
            config: Arc::new(config),
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// A dispatcher that drops everything; used when sync is not configured
    pub fn disabled() -> Self {
        Self::new(IdentitySyncConfig {
            enabled: false,
            base_url: String::new(),
            token: String::new(),
            user_agent: "mwork-auth".to_string(),
            timeout: Duration::from_secs(10),
            max_in_flight: 1,
        })
    }

    /// Queue a sync notification on a detached task.
    ///
    /// Returns immediately. The task runs with its own timeout and may
    /// outlive the originating request. When the in-flight bound is reached
    /// the payload is dropped, consistent with at-most-once delivery.
    pub fn dispatch(&self, payload: IdentitySyncPayload) {
        let Some(client) = self.client.clone() else {
            debug!("identity sync disabled, skipping user {}", payload.mwork_user_id);
            return;
        };

        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "identity sync at capacity, dropping dispatch for user {}",
                    payload.mwork_user_id
                );
                return;
            }
        };

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), SYNC_PATH);
        let token = self.config.token.clone();

        tokio::spawn(async move {
            let user_id = payload.mwork_user_id;
            match send(client, url, token, payload).await {
                Ok(()) => debug!("identity sync delivered for user {}", user_id),
                Err(e) => error!("identity sync failed for user {}: {}", user_id, e),
            }
            drop(permit);
        });
    }
}

/// Single delivery attempt. Any non-2xx status or transport error is a
/// dispatch failure.
async fn send(
    client: HttpClient,
    url: String,
    token: String,
    payload: IdentitySyncPayload,
) -> Result<(), String> {
    let response = client
        .post(&url)
        .bearer_auth(token)
        .json(&payload)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("unexpected status {}", response.status()))
    }
}
