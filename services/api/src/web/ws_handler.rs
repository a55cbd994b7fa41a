//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! One connection is one tracker session: it resolves editor or viewer mode,
//! loads the document, applies mutations, and drives the persistence task.

use crate::web::{
    middleware::CurrentIdentity,
    persistence_task::persistence_process,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, SessionState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{stream::StreamExt, SinkExt};
use intern_tracker_core::{
    domain::Identity,
    mode::{load_session, resolve_mode, SessionMode},
    summary::DashboardSummary,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{
    mpsc::{self, UnboundedSender},
    Mutex,
};
use tracing::{error, info, warn};
use uuid::Uuid;

const SIGNED_OUT_MESSAGE: &str = "Sign in to open your tracker.";

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    /// Another identity's document to open read-only.
    pub view: Option<Uuid>,
}

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    Extension(CurrentIdentity(identity)): Extension<CurrentIdentity>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, query.view, identity))
}

fn session_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn handle_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    view: Option<Uuid>,
    identity: Option<Identity>,
) {
    let (mut sender, mut receiver) = socket.split();

    // All outgoing messages go through one channel so the session loop and the
    // persistence task never contend for the socket.
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to encode server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                info!("Client went away; stopping writer.");
                break;
            }
        }
    });

    // --- 1. Mode Resolution and Load ---
    let mode = resolve_mode(view, identity.as_ref());
    info!("New WebSocket session in mode {:?}", mode);
    let opened = load_session(app_state.documents.as_ref(), mode, identity.as_ref())
        .await
        .and_then(|loaded| {
            let kind = loaded.mode.kind()?;
            let owner = loaded.mode.owner()?;
            Some((loaded, kind, owner))
        });
    let Some((loaded, kind, owner)) = opened else {
        let _ = outbox.send(ServerMessage::Error {
            message: SIGNED_OUT_MESSAGE.to_string(),
        });
        drop(outbox);
        let _ = writer.await;
        return;
    };

    let state = SessionState::from_loaded(loaded, app_state.config.save, session_now());
    let _ = outbox.send(ServerMessage::SessionInitialized {
        mode: kind,
        owner,
        document: state.store.document().clone(),
        summary: DashboardSummary::from_document(state.store.document()),
    });
    let _ = outbox.send(ServerMessage::SaveStatus {
        state: state.controller.state(session_now()),
    });

    let wake = state.wake.clone();
    let token = state.cancellation_token.clone();
    let session_state_lock = Arc::new(Mutex::new(state));
    if mode.is_editor() {
        app_state.sessions.register(owner, &session_state_lock);
    }

    // --- 2. Persistence Task (editor sessions only) ---
    let persistence_handle = if mode.is_editor() {
        let documents = app_state.documents.clone();
        let session_state_lock = session_state_lock.clone();
        let outbox = outbox.clone();
        let token = token.clone();
        Some(tokio::spawn(persistence_process(
            documents,
            session_state_lock,
            wake,
            outbox,
            token,
        )))
    } else {
        None
    };

    // --- 3. Main Message Loop ---
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text_message(text.as_str(), &session_state_lock, &outbox).await;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    // Cancelling makes the persistence task flush once; the write is awaited.
    token.cancel();
    if let Some(handle) = persistence_handle {
        if let Err(e) = handle.await {
            error!("Persistence task panicked: {:?}", e);
        }
    }
    drop(outbox);
    let _ = writer.await;
    info!("WebSocket connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
pub(crate) async fn handle_text_message(
    text: &str,
    session_state_lock: &Arc<Mutex<SessionState>>,
    outbox: &UnboundedSender<ServerMessage>,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            let _ = outbox.send(ServerMessage::Error {
                message: format!("Unrecognized message: {}", e),
            });
            return;
        }
    };

    let mut session = session_state_lock.lock().await;
    let session = &mut *session;

    let is_mutation = matches!(
        client_msg,
        ClientMessage::Mutate { .. } | ClientMessage::AddShelf { .. } | ClientMessage::AddSite { .. }
    );
    if is_mutation && !matches!(session.mode, SessionMode::Editor { .. }) {
        let message = match session.mode {
            SessionMode::SignedOut => SIGNED_OUT_MESSAGE,
            _ => "This tracker is shared read-only.",
        };
        let _ = outbox.send(ServerMessage::Error {
            message: message.to_string(),
        });
        return;
    }

    let reply = match client_msg {
        ClientMessage::Mutate { mutation } => {
            info!("Applying mutation {}", mutation.name());
            session
                .store
                .apply(&mutation)
                .then(|| ServerMessage::Applied {
                    version: session.store.version(),
                })
        }
        ClientMessage::AddShelf { name } => session
            .store
            .add_shelf(name)
            .map(|shelf| ServerMessage::ShelfCreated { shelf }),
        ClientMessage::AddSite { site } => session
            .store
            .add_site(site)
            .map(|site| ServerMessage::SiteCreated { site }),
        ClientMessage::Flush { trigger } => {
            info!("Flush requested ({:?}).", trigger);
            session.controller.request_flush(trigger);
            session.wake.notify_one();
            return;
        }
        ClientMessage::DismissError => {
            session.controller.dismiss_error();
            let _ = outbox.send(ServerMessage::SaveStatus {
                state: session.controller.state(session_now()),
            });
            return;
        }
    };

    if let Some(reply) = reply {
        let now = session_now();
        if session.controller.record_change(session.store.document(), now) {
            let _ = outbox.send(ServerMessage::SaveStatus {
                state: session.controller.state(now),
            });
        }
        session.wake.notify_one();
        let _ = outbox.send(reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intern_tracker_core::{
        domain::{Document, SchoolLevel},
        mode::LoadedSession,
        persistence::{SaveSettings, SyncState},
        store::{Access, StateStore},
    };
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn session(mode: SessionMode) -> (Arc<Mutex<SessionState>>, UnboundedSender<ServerMessage>, UnboundedReceiver<ServerMessage>) {
        let access = if mode.is_editor() {
            Access::ReadWrite
        } else {
            Access::ReadOnly
        };
        let loaded = LoadedSession {
            mode,
            store: StateStore::new(Document::default(), access),
            needs_save: false,
        };
        let state = SessionState::from_loaded(loaded, SaveSettings::default(), session_now());
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Mutex::new(state)), tx, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[tokio::test]
    async fn editor_mutations_are_applied_and_marked_pending() {
        let (lock, tx, mut rx) = session(SessionMode::Editor { owner: Uuid::new_v4() });
        let add_site = json!({
            "type": "add_site",
            "site": {"name": "Lincoln Middle", "level": "Secondary", "mentorName": "R. Díaz"}
        });
        handle_text_message(&add_site.to_string(), &lock, &tx).await;

        let messages = drain(&mut rx);
        let site_id = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::SiteCreated { site } => Some(site.id.clone()),
                _ => None,
            })
            .expect("site created");
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::SaveStatus { state: SyncState::PendingWrite })));

        let remove = json!({
            "type": "mutate",
            "mutation": {"op": "remove_site", "id": site_id}
        });
        handle_text_message(&remove.to_string(), &lock, &tx).await;
        let session = lock.lock().await;
        assert!(session.store.document().sites.is_empty());
        assert_eq!(session.store.version(), 2);
    }

    #[tokio::test]
    async fn viewer_mutations_are_rejected() {
        let (lock, tx, mut rx) = session(SessionMode::Viewer { owner: Uuid::new_v4() });
        let add_shelf = json!({"type": "add_shelf", "name": "Observations"});
        handle_text_message(&add_shelf.to_string(), &lock, &tx).await;

        let messages = drain(&mut rx);
        assert!(matches!(messages.as_slice(), [ServerMessage::Error { .. }]));
        let session = lock.lock().await;
        assert!(session.store.document().shelves.is_empty());
        assert!(!session.controller.has_pending_change());
    }

    #[tokio::test]
    async fn signed_out_session_rejects_further_edits() {
        let (lock, tx, mut rx) = session(SessionMode::Editor { owner: Uuid::new_v4() });
        let add_shelf = json!({"type": "add_shelf", "name": "Observations"});
        handle_text_message(&add_shelf.to_string(), &lock, &tx).await;
        lock.lock().await.sign_out();
        drain(&mut rx);

        handle_text_message(&add_shelf.to_string(), &lock, &tx).await;
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { message }] if message == SIGNED_OUT_MESSAGE
        ));
        let session = lock.lock().await;
        assert_eq!(session.store.document().shelves.len(), 1);
        assert!(!session.controller.has_pending_change());
    }

    #[tokio::test]
    async fn malformed_messages_get_an_error_reply() {
        let (lock, tx, mut rx) = session(SessionMode::Editor { owner: Uuid::new_v4() });
        handle_text_message("{\"type\":\"teleport\"}", &lock, &tx).await;
        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn site_levels_round_trip_through_the_protocol() {
        let (lock, tx, _rx) = session(SessionMode::Editor { owner: Uuid::new_v4() });
        let add_site = json!({
            "type": "add_site",
            "site": {"name": "Bay Alt", "level": "Alternate", "mentorName": "Ng"}
        });
        handle_text_message(&add_site.to_string(), &lock, &tx).await;
        let session = lock.lock().await;
        assert_eq!(session.store.document().sites[0].level, SchoolLevel::Alternate);
    }
}
