//! Push session state machine
//!
//! A push session spans every request of one update (a zip push, or a run of
//! put-file requests announced by an `expectBytes` hint on the first one).
//! It starts `Idle`, becomes `Active` on [`UpdateSession::begin`] and drops
//! back to `Idle` when the accounted bytes reach the expected total, or when a
//! failed transfer resets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::Application;

/// Push session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Active,
}

/// Byte accounting for one application's in-flight push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSession {
    state: SessionState,
    bytes_expected: Option<u64>,
    bytes_received: u64,
    last_updated: Option<DateTime<Utc>>,
}

/// Emitted once when a push session completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushComplete {
    pub app_id: String,
    pub bytes_received: u64,
    pub completed_at: DateTime<Utc>,
}

/// Callback invoked on push completion
pub type PushCompleteCallback = Arc<dyn Fn(PushComplete) + Send + Sync>;

impl UpdateSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a push session
    ///
    /// An active session is joined rather than restarted unless `restart` is
    /// set, so the requests of a multi-file push accumulate into one total.
    pub fn begin(&mut self, expected: Option<u64>, restart: bool) {
        if self.state == SessionState::Active && !restart {
            return;
        }
        self.state = SessionState::Active;
        self.bytes_expected = expected;
        self.bytes_received = 0;
    }

    /// Add `n` received bytes; returns the completed byte total when this
    /// crosses the expected size
    ///
    /// Without a known total the session completes on the first accounting.
    pub fn account_bytes(&mut self, n: u64) -> Option<(u64, DateTime<Utc>)> {
        if self.state != SessionState::Active {
            tracing::debug!("Ignoring {} bytes accounted outside a push session", n);
            return None;
        }

        self.bytes_received = self.bytes_received.saturating_add(n);
        let complete = match self.bytes_expected {
            Some(expected) => self.bytes_received >= expected,
            None => true,
        };
        if !complete {
            return None;
        }

        let now = Utc::now();
        let total = self.bytes_received;
        self.last_updated = Some(now);
        self.state = SessionState::Idle;
        self.bytes_expected = None;
        self.bytes_received = 0;
        Some((total, now))
    }

    /// Abandon the session without marking the application updated
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.bytes_expected = None;
        self.bytes_received = 0;
    }

    /// Fraction of the expected bytes received so far, in `[0, 1]`
    pub fn progress(&self) -> Option<f64> {
        if self.state != SessionState::Active {
            return None;
        }
        match self.bytes_expected {
            Some(0) => Some(1.0),
            Some(expected) => Some((self.bytes_received as f64 / expected as f64).clamp(0.0, 1.0)),
            None => None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn bytes_expected(&self) -> Option<u64> {
        self.bytes_expected
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}

/// Delivers push-complete notifications
#[derive(Clone, Default)]
pub struct PushNotifier {
    callback: Option<PushCompleteCallback>,
}

impl PushNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: PushCompleteCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn notify(&self, event: PushComplete) {
        tracing::info!(
            "Update complete for {} ({} bytes)",
            event.app_id,
            event.bytes_received
        );
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

impl std::fmt::Debug for PushNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushNotifier")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Scope of one request's participation in a push session
///
/// Dropping it without calling [`PushScope::complete`] resets the session, so
/// errors, timeouts and cancelled requests all leave the application `Idle`.
pub struct PushScope<'a> {
    app: &'a Application,
    armed: bool,
}

impl<'a> PushScope<'a> {
    pub fn begin(app: &'a Application, expected: Option<u64>, restart: bool) -> Self {
        app.with_session(|session| session.begin(expected, restart));
        Self { app, armed: true }
    }

    /// Account this request's bytes, notifying if the session completed
    pub fn complete(mut self, bytes: u64, notifier: &PushNotifier) {
        self.armed = false;
        let completed = self.app.with_session(|session| session.account_bytes(bytes));
        if let Some((bytes_received, completed_at)) = completed {
            notifier.notify(PushComplete {
                app_id: self.app.id().to_string(),
                bytes_received,
                completed_at,
            });
        }
    }
}

impl Drop for PushScope<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Resetting push session for {}", self.app.id());
            self.app.with_session(UpdateSession::reset);
        }
    }
}
