//! crates/intern_tracker_core/src/mode.rs
//!
//! Decides once per session whether it edits the signed-in identity's own
//! document or views someone else's, and loads the document accordingly.

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{Document, Identity};
use crate::migration::migrate;
use crate::ports::DocumentStore;
use crate::store::{Access, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Read-write session bound to the signed-in identity's own document.
    Editor { owner: Uuid },
    /// Read-only session over another identity's document.
    Viewer { owner: Uuid },
    /// No document reference and no identity: nothing to load.
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Editor,
    Viewer,
}

impl SessionMode {
    pub fn owner(&self) -> Option<Uuid> {
        match self {
            SessionMode::Editor { owner } | SessionMode::Viewer { owner } => Some(*owner),
            SessionMode::SignedOut => None,
        }
    }

    pub fn kind(&self) -> Option<ModeKind> {
        match self {
            SessionMode::Editor { .. } => Some(ModeKind::Editor),
            SessionMode::Viewer { .. } => Some(ModeKind::Viewer),
            SessionMode::SignedOut => None,
        }
    }

    pub fn is_editor(&self) -> bool {
        matches!(self, SessionMode::Editor { .. })
    }
}

/// An explicit document reference always wins, even for a signed-in visitor.
pub fn resolve_mode(view: Option<Uuid>, identity: Option<&Identity>) -> SessionMode {
    match (view, identity) {
        (Some(owner), _) => SessionMode::Viewer { owner },
        (None, Some(identity)) => SessionMode::Editor {
            owner: identity.uid,
        },
        (None, None) => SessionMode::SignedOut,
    }
}

/// A session whose document has finished loading.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub mode: SessionMode,
    pub store: StateStore,
    /// Set when loading changed the document (e.g. a fresh profile snapshot),
    /// so the remote copy is stale until the next save.
    pub needs_save: bool,
}

/// Loads the document for a resolved mode.
///
/// Load failures are logged and replaced by the empty skeleton so the session
/// never blocks. Editor sessions get the identity's profile stamped on.
pub async fn load_session(
    documents: &dyn DocumentStore,
    mode: SessionMode,
    identity: Option<&Identity>,
) -> Option<LoadedSession> {
    let (owner, access) = match mode {
        SessionMode::Editor { owner } => (owner, Access::ReadWrite),
        SessionMode::Viewer { owner } => (owner, Access::ReadOnly),
        SessionMode::SignedOut => return None,
    };

    let mut document = match documents.load_document(owner).await {
        Ok(Some(raw)) => migrate(raw),
        Ok(None) => {
            info!("No document stored for {}, starting empty", owner);
            Document::default()
        }
        Err(e) => {
            error!("Failed to load document for {}: {}", owner, e);
            Document::default()
        }
    };

    let mut needs_save = false;
    if let (SessionMode::Editor { .. }, Some(identity)) = (mode, identity) {
        let profile = Some(identity.to_profile());
        needs_save = document.user_profile != profile;
        document.user_profile = profile;
    }

    Some(LoadedSession {
        mode,
        store: StateStore::new(document, access),
        needs_save,
    })
}
