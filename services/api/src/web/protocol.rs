//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for a tracker session.

use intern_tracker_core::{
    domain::{Document, NewSite, Shelf, Site},
    mode::ModeKind,
    persistence::{FlushTrigger, SyncState},
    store::Mutation,
    summary::DashboardSummary,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Applies one document mutation. The client supplies entity ids.
    Mutate { mutation: Mutation },

    /// Creates a shelf; the server picks the id and answers with `ShelfCreated`.
    AddShelf { name: String },

    /// Creates a site; the server picks the id and answers with `SiteCreated`.
    AddSite { site: NewSite },

    /// The page was hidden, lost focus, or is being torn down. Save now.
    Flush { trigger: FlushTrigger },

    /// Hides the current save error.
    DismissError,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The document finished loading. Sent once, first.
    SessionInitialized {
        mode: ModeKind,
        owner: Uuid,
        document: Document,
        summary: DashboardSummary,
    },

    /// A mutation was applied; `version` counts applied mutations.
    Applied { version: u64 },

    ShelfCreated { shelf: Shelf },

    SiteCreated { site: Site },

    /// The session's save state changed.
    SaveStatus { state: SyncState },

    /// The last save failed. Shown until dismissed or it times out.
    SaveFailed { message: String },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}
