//! services/api/src/web/persistence_task.rs
//!
//! This module contains the asynchronous "worker" function that writes an
//! editor session's document to the remote store.

use crate::web::{protocol::ServerMessage, state::SessionState};
use intern_tracker_core::{
    persistence::{FlushTrigger, SyncState},
    ports::DocumentStore,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc::UnboundedSender, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// The long-running save loop for one editor session.
///
/// It sleeps until the controller's next deadline, or until it is woken by a
/// mutation or flush request. On cancellation it flushes any pending change
/// once and exits. A write that has started is always awaited to completion.
pub async fn persistence_process(
    documents: Arc<dyn DocumentStore>,
    session_state_lock: Arc<Mutex<SessionState>>,
    wake: Arc<Notify>,
    outbox: UnboundedSender<ServerMessage>,
    cancellation_token: CancellationToken,
) {
    info!("Persistence process started.");
    let mut last_reported = { session_state_lock.lock().await.controller.state(now()) };

    loop {
        let wakeup = { session_state_lock.lock().await.controller.next_wakeup() };

        tokio::select! {
            _ = cancellation_token.cancelled() => {
                {
                    let mut session = session_state_lock.lock().await;
                    session.controller.request_flush(FlushTrigger::Teardown);
                }
                run_due_save(&documents, &session_state_lock, &outbox, &mut last_reported).await;
                info!("Persistence process stopped.");
                return;
            }
            _ = wake.notified() => {}
            _ = sleep_until(wakeup) => {}
        }

        run_due_save(&documents, &session_state_lock, &outbox, &mut last_reported).await;
    }
}

/// Performs at most one save, if the controller says one is due, and reports
/// state changes to the client.
async fn run_due_save(
    documents: &Arc<dyn DocumentStore>,
    session_state_lock: &Arc<Mutex<SessionState>>,
    outbox: &UnboundedSender<ServerMessage>,
    last_reported: &mut SyncState,
) {
    let request = {
        let mut session = session_state_lock.lock().await;
        let session = &mut *session;
        let now = now();
        session.controller.clear_expired_error(now);
        let request = session.controller.begin_save(session.store.document(), now);
        report_state(outbox, last_reported, session.controller.state(now));
        request
    };

    let Some(request) = request else {
        return;
    };

    let outcome = documents
        .save_document(request.owner, &request.snapshot)
        .await
        .map_err(|e| e.to_string());

    let mut session = session_state_lock.lock().await;
    let session = &mut *session;
    let now = now();
    match &outcome {
        Ok(()) => info!("Saved document for {}", request.owner),
        Err(message) => {
            error!("Failed to save document for {}: {}", request.owner, message);
            if outbox
                .send(ServerMessage::SaveFailed {
                    message: message.clone(),
                })
                .is_err()
            {
                warn!("Client outbox closed; save failure not delivered.");
            }
        }
    }
    session
        .controller
        .complete_save(request.snapshot, outcome, session.store.document(), now);
    report_state(outbox, last_reported, session.controller.state(now));
}

fn report_state(outbox: &UnboundedSender<ServerMessage>, last: &mut SyncState, state: SyncState) {
    if *last == state {
        return;
    }
    *last = state;
    // The client may already be gone during a teardown flush.
    let _ = outbox.send(ServerMessage::SaveStatus { state });
}
