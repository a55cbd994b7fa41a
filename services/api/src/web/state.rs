//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use intern_tracker_core::{
    mode::{LoadedSession, SessionMode},
    persistence::{PersistenceController, SaveSettings},
    ports::{CompetencySuggestionService, DatabaseService, DocumentStore},
    store::StateStore,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub documents: Arc<dyn DocumentStore>,
    pub config: Arc<Config>,
    /// `None` when no model credentials are configured.
    pub suggester: Option<Arc<dyn CompetencySuggestionService>>,
    /// Open editor sessions, so sign-out can reach them.
    pub sessions: Arc<SessionRegistry>,
}

//=========================================================================================
// SessionRegistry (Open Editor Sessions per Identity)
//=========================================================================================

/// Tracks the live editor sessions of each identity.
///
/// Entries are weak; a closed connection drops out on the next registration
/// or sign-out for the same identity.
#[derive(Default)]
pub struct SessionRegistry {
    editors: std::sync::Mutex<HashMap<Uuid, Vec<Weak<Mutex<SessionState>>>>>,
}

impl SessionRegistry {
    pub fn register(&self, owner: Uuid, session: &Arc<Mutex<SessionState>>) {
        let mut editors = self.editors.lock().unwrap_or_else(|e| e.into_inner());
        let entries = editors.entry(owner).or_default();
        entries.retain(|entry| entry.strong_count() > 0);
        entries.push(Arc::downgrade(session));
    }

    /// Signs out every open editor session of `owner`. Returns how many were
    /// still open.
    pub async fn sign_out(&self, owner: Uuid) -> usize {
        let live: Vec<Arc<Mutex<SessionState>>> = {
            let mut editors = self.editors.lock().unwrap_or_else(|e| e.into_inner());
            editors
                .remove(&owner)
                .unwrap_or_default()
                .iter()
                .filter_map(Weak::upgrade)
                .collect()
        };
        for session in &live {
            session.lock().await.sign_out();
        }
        if !live.is_empty() {
            info!("Signed out {} open session(s) for {}", live.len(), owner);
        }
        live.len()
    }
}

//=========================================================================================
// SessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection.
pub struct SessionState {
    pub mode: SessionMode,
    pub store: StateStore,
    pub controller: PersistenceController,
    /// Wakes the persistence task after a mutation or flush request.
    pub wake: Arc<Notify>,
    /// Cancelled on disconnect; the persistence task flushes and exits.
    pub cancellation_token: CancellationToken,
}

impl SessionState {
    /// Builds the state for a session whose document has finished loading.
    pub fn from_loaded(loaded: LoadedSession, settings: SaveSettings, now: Instant) -> Self {
        let mut controller = PersistenceController::new(settings);
        let editor_owner = match loaded.mode {
            SessionMode::Editor { owner } => Some(owner),
            _ => None,
        };
        controller.mark_loaded(editor_owner, loaded.store.document());
        if loaded.needs_save {
            controller.mark_stale(now);
        }
        Self {
            mode: loaded.mode,
            store: loaded.store,
            controller,
            wake: Arc::new(Notify::new()),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Detaches the session from its identity. Unsaved changes are discarded
    /// and nothing is written afterwards.
    pub fn sign_out(&mut self) {
        self.mode = SessionMode::SignedOut;
        self.controller.unbind();
        self.wake.notify_one();
    }
}
