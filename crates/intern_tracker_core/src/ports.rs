//! crates/intern_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the identity provider, the document store, and the
//! suggestion model behind them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::catalog::{self, Competency};
use crate::domain::{Document, Identity, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Identities and browser auth sessions.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> PortResult<Identity>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<Identity>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

/// The remote document store: one document per owner, whole-document writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the raw persisted shape, which may predate the current schema.
    async fn load_document(&self, owner: Uuid) -> PortResult<Option<Value>>;

    /// Overwrites the owner's document. Last write wins.
    async fn save_document(&self, owner: Uuid, document: &Document) -> PortResult<()>;
}

#[async_trait]
pub trait CompetencySuggestionService: Send + Sync {
    /// Picks the catalog competencies that fit a free-text activity description.
    async fn suggest_competencies(
        &self,
        activity: &str,
        catalog: &[Competency],
    ) -> PortResult<Vec<String>>;
}

/// Best-effort suggestions: every failure degrades to an empty list, and ids
/// outside the catalog are discarded.
pub async fn suggest_or_empty(
    service: Option<&dyn CompetencySuggestionService>,
    activity: &str,
) -> Vec<String> {
    let Some(service) = service else {
        return Vec::new();
    };
    if activity.trim().is_empty() {
        return Vec::new();
    }
    match service
        .suggest_competencies(activity, catalog::ALL_COMPETENCIES)
        .await
    {
        Ok(ids) => {
            let mut known: Vec<String> = Vec::with_capacity(ids.len());
            for id in ids {
                if catalog::is_known(&id) && !known.contains(&id) {
                    known.push(id);
                }
            }
            known
        }
        Err(e) => {
            warn!("Competency suggestion failed: {}", e);
            Vec::new()
        }
    }
}
