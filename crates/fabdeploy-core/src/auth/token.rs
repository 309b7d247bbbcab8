//! Cached bearer token with proactive refresh.
//!
//! Callers read the token through [`TokenSource::current_token`] on every
//! request and never hold on to it across retries; the cache replaces the
//! token once it is within the refresh buffer of its expiry.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::credential::{CredentialSource, to_chrono};

/// Tokens this close to expiry are replaced before use.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub acquired_at: DateTime<Utc>,
}

impl TokenInfo {
    pub fn new(token: String, acquired_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token,
            expires_at,
            acquired_at,
        }
    }

    /// Stale once `expires_at - now <= buffer`.
    pub fn is_stale(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at - now <= to_chrono(buffer)
    }
}

/// A second, separately authenticated client (for example a CLI-backed
/// executor) that must be handed the current token.
pub trait SecondaryAuth {
    fn reauthenticate(&self, token: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct TokenState {
    current: Option<TokenInfo>,
    secondary: Option<SecondarySync>,
}

#[derive(Debug, Clone)]
struct SecondarySync {
    token: String,
    synced_at: DateTime<Utc>,
}

pub struct TokenSource {
    credential: Arc<dyn CredentialSource>,
    clock: Arc<dyn Clock>,
    refresh_buffer: Duration,
    state: Mutex<TokenState>,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSource")
            .field("refresh_buffer", &self.refresh_buffer)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    pub fn new(credential: Arc<dyn CredentialSource>) -> Self {
        Self::with_clock(credential, Arc::new(SystemClock))
    }

    pub fn with_clock(credential: Arc<dyn CredentialSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            credential,
            clock,
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            state: Mutex::new(TokenState::default()),
        }
    }

    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    /// Current token, acquiring a new one when missing or stale.
    ///
    /// Acquisition failures propagate; an expired token is never returned.
    pub fn current_token(&self) -> anyhow::Result<String> {
        let mut state = self.lock();
        let now = self.clock.now();
        if let Some(info) = &state.current
            && !info.is_stale(now, self.refresh_buffer)
        {
            return Ok(info.token.clone());
        }

        let refreshing = state.current.is_some();
        let info = self.credential.acquire(now)?;
        debug!(
            refreshing,
            expires_in_secs = (info.expires_at - now).num_seconds(),
            "Acquired bearer token"
        );
        let token = info.token.clone();
        state.current = Some(info);
        Ok(token)
    }

    /// Drop the cached token so the next call re-acquires.
    pub fn invalidate(&self) {
        self.lock().current = None;
    }

    /// Seconds since the cached token was acquired.
    pub fn age_seconds(&self) -> Option<i64> {
        let now = self.clock.now();
        self.lock()
            .current
            .as_ref()
            .map(|info| (now - info.acquired_at).num_seconds())
    }

    /// Seconds until the cached token expires (negative once expired).
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        let now = self.clock.now();
        self.lock()
            .current
            .as_ref()
            .map(|info| (info.expires_at - now).num_seconds())
    }

    /// Re-authenticate `secondary` when the token changed since the last sync
    /// or the secondary's auth is older than `max_age`.
    ///
    /// Returns `true` when re-authentication happened.
    pub fn ensure_fresh_auth(
        &self,
        secondary: &dyn SecondaryAuth,
        max_age: Duration,
    ) -> anyhow::Result<bool> {
        let token = self.current_token()?;
        let now = self.clock.now();
        let needs_sync = match &self.lock().secondary {
            None => true,
            Some(sync) => sync.token != token || now - sync.synced_at > to_chrono(max_age),
        };
        if !needs_sync {
            return Ok(false);
        }

        secondary.reauthenticate(&token)?;
        info!("Re-authenticated secondary client");
        self.lock().secondary = Some(SecondarySync {
            token,
            synced_at: now,
        });
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
