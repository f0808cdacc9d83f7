//! Application handles

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::traits::AssetStore;
use crate::sync::UpdateSession;

/// Shared handle to an installed application
pub type AppHandle = Arc<Application>;

/// An installed application and its push state
///
/// The session lives behind a short-lived sync mutex that is never held across
/// an await. `push_lock` serializes mutating handlers for this application.
/// Once uninstalled the handle is marked removed; holders of a stale handle
/// must check [`Application::is_removed`] after taking the push lock.
pub struct Application {
    id: String,
    app_type: String,
    store: Arc<dyn AssetStore>,
    session: Mutex<UpdateSession>,
    push_lock: tokio::sync::Mutex<()>,
    removed: AtomicBool,
}

/// Application entry of the `/info` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub app_id: String,
    pub app_type: String,
    pub update_in_progress: bool,
    pub update_progress: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Application {
    pub fn new(
        id: impl Into<String>,
        app_type: impl Into<String>,
        store: Arc<dyn AssetStore>,
    ) -> AppHandle {
        Arc::new(Self {
            id: id.into(),
            app_type: app_type.into(),
            store,
            session: Mutex::new(UpdateSession::new()),
            push_lock: tokio::sync::Mutex::new(()),
            removed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app_type(&self) -> &str {
        &self.app_type
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    /// Copy of the current push session state
    pub fn session(&self) -> UpdateSession {
        self.session.lock().clone()
    }

    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut UpdateSession) -> R) -> R {
        f(&mut self.session.lock())
    }

    /// Wait for exclusive mutation rights on this application
    pub async fn lock_for_push(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.push_lock.lock().await
    }

    /// Whether the application has been uninstalled
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Flag the application as uninstalled, returning `false` if it already was
    ///
    /// Call with the push lock held.
    pub(crate) fn mark_removed(&self) -> bool {
        !self.removed.swap(true, Ordering::AcqRel)
    }

    pub fn summary(&self) -> AppSummary {
        let session = self.session.lock();
        AppSummary {
            app_id: self.id.clone(),
            app_type: self.app_type.clone(),
            update_in_progress: session.is_active(),
            update_progress: session.progress(),
            last_updated: session.last_updated(),
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("app_type", &self.app_type)
            .field("session", &*self.session.lock())
            .finish()
    }
}
