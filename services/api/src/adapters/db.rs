//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` and `DocumentStore` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intern_tracker_core::domain::{Document, Identity, UserCredentials};
use intern_tracker_core::ports::{DatabaseService, DocumentStore, PortError, PortResult};
use serde_json::Value;
use sqlx::{types::Json, FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` and `DocumentStore` ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
    photo_url: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> Identity {
        Identity {
            uid: self.user_id,
            display_name: self.display_name,
            email: Some(self.email),
            photo_url: self.photo_url,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
    photo_url: Option<String>,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            identity: Identity {
                uid: self.user_id,
                display_name: self.display_name,
                email: Some(self.email),
                photo_url: self.photo_url,
            },
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct DocumentRecord {
    body: Json<Value>,
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password, display_name, photo_url) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING user_id, email, display_name, photo_url",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(display_name)
        .bind(photo_url)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, display_name, photo_url, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, display_name, photo_url FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT user_id, expires_at FROM auth_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        if record.expires_at <= Utc::now() {
            debug!("Auth session expired for user {}", record.user_id);
            return Err(PortError::Unauthorized);
        }
        Ok(record.user_id)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn load_document(&self, owner: Uuid) -> PortResult<Option<Value>> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT body FROM intern_documents WHERE owner_id = $1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.body.0))
    }

    async fn save_document(&self, owner: Uuid, document: &Document) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO intern_documents (owner_id, body, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (owner_id) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
        )
        .bind(owner)
        .bind(Json(document))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
