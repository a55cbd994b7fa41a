//! crates/intern_tracker_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! The `Document` is the whole persisted unit, one per owner identity; its
//! serialized form uses the camelCase field names every client has written.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Generates a fresh entity id.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

//=========================================================================================
// Enumerations
//=========================================================================================

/// One of four ordinal competency-mastery ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttainmentLevel {
    Emerging,
    Developing,
    Proficient,
    Exemplary,
}

impl AttainmentLevel {
    pub const ALL: [AttainmentLevel; 4] = [
        AttainmentLevel::Emerging,
        AttainmentLevel::Developing,
        AttainmentLevel::Proficient,
        AttainmentLevel::Exemplary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttainmentLevel::Emerging => "Emerging",
            AttainmentLevel::Developing => "Developing",
            AttainmentLevel::Proficient => "Proficient",
            AttainmentLevel::Exemplary => "Exemplary",
        }
    }

    /// Case-insensitive lookup used when reading persisted progress maps.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// A value in the progress map.
///
/// Anything that isn't one of the four levels is kept verbatim in `Other`, the
/// same way `SchoolLevel::Other` keeps unknown levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressValue {
    Level(AttainmentLevel),
    Other(Value),
}

impl ProgressValue {
    pub fn level(&self) -> Option<AttainmentLevel> {
        match self {
            ProgressValue::Level(level) => Some(*level),
            ProgressValue::Other(_) => None,
        }
    }
}

impl From<AttainmentLevel> for ProgressValue {
    fn from(level: AttainmentLevel) -> Self {
        ProgressValue::Level(level)
    }
}

/// The school level of a log entry or a site.
///
/// Values written by clients this build doesn't know about are kept verbatim
/// in `Other` so they survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SchoolLevel {
    Primary,
    Secondary,
    Alternate,
    Other(String),
}

impl SchoolLevel {
    pub fn as_str(&self) -> &str {
        match self {
            SchoolLevel::Primary => "Primary",
            SchoolLevel::Secondary => "Secondary",
            SchoolLevel::Alternate => "Alternate",
            SchoolLevel::Other(value) => value,
        }
    }
}

impl Default for SchoolLevel {
    fn default() -> Self {
        SchoolLevel::Secondary
    }
}

impl From<String> for SchoolLevel {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Primary" => SchoolLevel::Primary,
            "Secondary" => SchoolLevel::Secondary,
            "Alternate" => SchoolLevel::Alternate,
            _ => SchoolLevel::Other(value),
        }
    }
}

impl From<SchoolLevel> for String {
    fn from(level: SchoolLevel) -> Self {
        match level {
            SchoolLevel::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SchoolLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single global display/aggregation preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimarySetting {
    Primary,
    #[default]
    Secondary,
}

//=========================================================================================
// Entities
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub activity: String,
    pub location: String,
    pub school_level: SchoolLevel,
    pub tagged_competency_ids: Vec<String>,
    pub reflections: String,
    /// Reserved. No mutation path links artifacts from the log side.
    pub artifact_ids: Vec<String>,
    /// Fields written by other clients, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A piece of evidence. `data` holds the payload as a data URI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub data: String,
    pub upload_date: String,
    pub tagged_competency_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    pub level: SchoolLevel,
    pub mentor_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A site as submitted by a client, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    pub name: String,
    pub level: SchoolLevel,
    pub mentor_name: String,
}

/// Denormalized snapshot of the owner's identity, so viewers can render it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

//=========================================================================================
// The Document
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub logs: Vec<LogEntry>,
    pub artifacts: Vec<Artifact>,
    pub progress: BTreeMap<String, ProgressValue>,
    pub shelves: Vec<Shelf>,
    pub sites: Vec<Site>,
    pub competency_reflections: BTreeMap<String, String>,
    pub primary_setting: PrimarySetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserProfile>,
    /// Top-level fields this build doesn't know, including anything migration
    /// could not place (under `unrecognized`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// The recognized attainment level for a competency, if any.
    pub fn level_of(&self, competency_id: &str) -> Option<AttainmentLevel> {
        self.progress.get(competency_id).and_then(ProgressValue::level)
    }

    pub fn artifacts_on_shelf<'a>(&'a self, shelf_id: &'a str) -> impl Iterator<Item = &'a Artifact> {
        self.artifacts
            .iter()
            .filter(move |artifact| artifact.shelf_id.as_deref() == Some(shelf_id))
    }

    /// Logs sorted for display, most recent date first. Ties keep entry order.
    pub fn logs_newest_first(&self) -> Vec<&LogEntry> {
        let mut logs: Vec<&LogEntry> = self.logs.iter().collect();
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        logs
    }
}

//=========================================================================================
// Identities and auth
//=========================================================================================

/// The signed-in identity, as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            name: self.display_name.clone(),
            email: self.email.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub identity: Identity,
    pub hashed_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_school_level_round_trips_verbatim() {
        let level: SchoolLevel = serde_json::from_value(json!("Charter")).unwrap();
        assert_eq!(level, SchoolLevel::Other("Charter".to_string()));
        assert_eq!(serde_json::to_value(&level).unwrap(), json!("Charter"));
    }

    #[test]
    fn artifact_uses_persisted_field_names() {
        let artifact = Artifact {
            id: "a1".into(),
            name: "minutes.pdf".into(),
            mime_type: "application/pdf".into(),
            data: "data:application/pdf;base64,AAAA".into(),
            upload_date: "3/4/2025".into(),
            tagged_competency_ids: vec!["A1".into()],
            shelf_id: None,
            extra: Map::new(),
        };
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["type"], "application/pdf");
        assert_eq!(value["uploadDate"], "3/4/2025");
        assert!(value.get("shelfId").is_none());
    }

    #[test]
    fn attainment_levels_are_ordinal() {
        assert!(AttainmentLevel::Emerging < AttainmentLevel::Exemplary);
        assert_eq!(
            AttainmentLevel::parse_lenient("PROFICIENT"),
            Some(AttainmentLevel::Proficient)
        );
        assert_eq!(AttainmentLevel::parse_lenient("Mastered"), None);
    }

    #[test]
    fn logs_newest_first_does_not_reorder_the_document() {
        let mut doc = Document::default();
        for (id, date) in [("1", "2025-01-10"), ("2", "2025-03-01"), ("3", "2025-02-14")] {
            doc.logs.push(LogEntry {
                id: id.into(),
                date: date.into(),
                ..LogEntry::default()
            });
        }
        let sorted: Vec<&str> = doc.logs_newest_first().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(sorted, vec!["2", "3", "1"]);
        assert_eq!(doc.logs[0].id, "1");
    }
}
