pub mod catalog;
pub mod domain;
pub mod migration;
pub mod mode;
pub mod persistence;
pub mod ports;
pub mod store;
pub mod summary;

pub use catalog::{Competency, ALL_COMPETENCIES};
pub use domain::{
    Artifact, AttainmentLevel, Document, Identity, LogEntry, NewSite, ProgressValue,
    PrimarySetting, SchoolLevel, Shelf, Site, UserCredentials, UserProfile,
};
pub use migration::migrate;
pub use mode::{load_session, resolve_mode, LoadedSession, ModeKind, SessionMode};
pub use persistence::{FlushTrigger, PersistenceController, SaveRequest, SaveSettings, SyncState};
pub use ports::{
    suggest_or_empty, CompetencySuggestionService, DatabaseService, DocumentStore, PortError,
    PortResult,
};
pub use store::{Access, Mutation, StateStore};
pub use summary::DashboardSummary;
