//! crates/intern_tracker_core/src/migration.rs
//!
//! Normalizes any persisted document shape into the current schema.
//!
//! Documents carry no version field, so the version is sniffed from the shape:
//! missing collections, the retired `Elementary` level, mistyped fields. The
//! raw JSON is rewritten first (`migrate_value`) and only then deserialized,
//! which keeps `migrate` total over arbitrary input.
//!
//! Migration relabels but never discards. Fields it doesn't know are carried
//! through as they are, and values that cannot sit where they were found are
//! kept under the top-level `unrecognized` key, so a later whole-document save
//! writes them back.

use crate::domain::{AttainmentLevel, Document};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Level name that earlier clients used before it was renamed to `Primary`.
const LEGACY_ELEMENTARY: &str = "Elementary";
const DEFAULT_PRIMARY_SETTING: &str = "Secondary";
const DEFAULT_SCHOOL_LEVEL: &str = "Secondary";

/// Top-level key for values that have no place in the current schema.
pub const UNRECOGNIZED_KEY: &str = "unrecognized";

/// Namespace for ids derived for entities that were stored without one.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x4f1c_9a2e_7b35_4d08_a6e1_2c90_b7d4_e513);

/// Migrates a persisted document of unknown shape. Never fails.
pub fn migrate(raw: Value) -> Document {
    let normalized = migrate_value(raw);
    match serde_json::from_value::<Document>(normalized) {
        Ok(document) => document,
        Err(e) => {
            error!("Normalized document failed to deserialize, using empty skeleton: {}", e);
            Document::default()
        }
    }
}

/// Rewrites a raw document into the exact JSON shape of the current schema.
///
/// Deterministic: the same input always yields the same output, including the
/// ids derived for entities stored without one.
pub fn migrate_value(raw: Value) -> Value {
    let mut unrecognized = Unrecognized::default();
    let mut source = match raw {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            warn!("Persisted document is not an object ({}), starting from empty", kind(&other));
            unrecognized.keep("document", other);
            Map::new()
        }
    };
    unrecognized.absorb(source.remove(UNRECOGNIZED_KEY));

    let mut out = Map::new();
    out.insert(
        "logs".into(),
        entities(source.remove("logs"), "logs", normalize_log, &mut unrecognized),
    );
    out.insert(
        "artifacts".into(),
        entities(source.remove("artifacts"), "artifacts", normalize_artifact, &mut unrecognized),
    );
    out.insert(
        "progress".into(),
        normalize_progress(source.remove("progress"), &mut unrecognized),
    );
    out.insert(
        "shelves".into(),
        entities(source.remove("shelves"), "shelves", normalize_shelf, &mut unrecognized),
    );
    out.insert(
        "sites".into(),
        entities(source.remove("sites"), "sites", normalize_site, &mut unrecognized),
    );
    out.insert(
        "competencyReflections".into(),
        normalize_reflections(source.remove("competencyReflections"), &mut unrecognized),
    );
    out.insert(
        "primarySetting".into(),
        normalize_primary_setting(source.remove("primarySetting"), &mut unrecognized),
    );
    if let Some(profile) = normalize_profile(source.remove("userProfile"), &mut unrecognized) {
        out.insert("userProfile".into(), profile);
    }

    if !source.is_empty() {
        debug!(
            "Carrying unrecognized top-level fields: {:?}",
            source.keys().collect::<Vec<_>>()
        );
        out.extend(source);
    }
    if let Some(kept) = unrecognized.into_value() {
        out.insert(UNRECOGNIZED_KEY.into(), kept);
    }
    Value::Object(out)
}

//=========================================================================================
// The unrecognized-value stash
//=========================================================================================

/// Values set aside during migration, grouped by where they were found.
#[derive(Default)]
struct Unrecognized(Map<String, Value>);

impl Unrecognized {
    /// Starts from whatever an earlier migration already set aside.
    fn absorb(&mut self, previous: Option<Value>) {
        match previous {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => self.0.extend(map),
            Some(other) => self.keep(UNRECOGNIZED_KEY, other),
        }
    }

    fn keep(&mut self, place: &str, value: Value) {
        let slot = self
            .0
            .entry(place)
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => {
                let prior = other.take();
                *other = Value::Array(vec![prior, value]);
            }
        }
    }

    fn into_value(self) -> Option<Value> {
        (!self.0.is_empty()).then_some(Value::Object(self.0))
    }
}

//=========================================================================================
// Entity normalizers
//=========================================================================================

type Normalizer = fn(Entity<'_>) -> Value;

fn entities(
    value: Option<Value>,
    collection: &'static str,
    normalize: Normalizer,
    unrecognized: &mut Unrecognized,
) -> Value {
    let items = match value {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => return Value::Array(Vec::new()),
        Some(other) => {
            warn!("Expected an array of {}, found {}", collection, kind(&other));
            unrecognized.keep(collection, other);
            return Value::Array(Vec::new());
        }
    };
    let mut normalized = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => {
                normalized.push(normalize(Entity::new(collection, index, map, unrecognized)))
            }
            other => {
                warn!("Keeping aside {} entry that is not an object ({})", collection, kind(&other));
                unrecognized.keep(collection, other);
            }
        }
    }
    Value::Array(normalized)
}

fn normalize_log(mut entity: Entity<'_>) -> Value {
    entity
        .string("date")
        .string("startTime")
        .string("endTime")
        .hours()
        .optional_string("title")
        .string("activity")
        .string("location")
        .school_level("schoolLevel")
        .string_list("taggedCompetencyIds")
        .string("reflections")
        .string_list("artifactIds");
    entity.finish()
}

fn normalize_artifact(mut entity: Entity<'_>) -> Value {
    entity
        .string("name")
        .string("type")
        .string("data")
        .string("uploadDate")
        .string_list("taggedCompetencyIds")
        .optional_string("shelfId");
    entity.finish()
}

fn normalize_shelf(mut entity: Entity<'_>) -> Value {
    entity.string("name");
    entity.finish()
}

fn normalize_site(mut entity: Entity<'_>) -> Value {
    entity
        .string("name")
        .school_level("level")
        .string("mentorName");
    entity.finish()
}

/// One entity being rewritten field by field. Whatever is left in `source` when
/// it finishes is carried through unchanged.
struct Entity<'a> {
    collection: &'static str,
    id: String,
    source: Map<String, Value>,
    out: Map<String, Value>,
    unrecognized: &'a mut Unrecognized,
}

impl<'a> Entity<'a> {
    fn new(
        collection: &'static str,
        index: usize,
        mut source: Map<String, Value>,
        unrecognized: &'a mut Unrecognized,
    ) -> Self {
        let id = entity_id(collection, index, &mut source);
        let mut out = Map::new();
        out.insert("id".into(), Value::String(id.clone()));
        Self {
            collection,
            id,
            source,
            out,
            unrecognized,
        }
    }

    fn set_aside(&mut self, field: &str, value: Value) {
        warn!(
            "Keeping aside unreadable {} of {} entry {}",
            field, self.collection, self.id
        );
        let mut misfit = Map::new();
        misfit.insert("id".into(), Value::String(self.id.clone()));
        misfit.insert("field".into(), Value::String(field.to_string()));
        misfit.insert("value".into(), value);
        self.unrecognized.keep(self.collection, Value::Object(misfit));
    }

    fn string(&mut self, field: &str) -> &mut Self {
        let value = match self.source.remove(field) {
            None | Some(Value::Null) => String::new(),
            Some(value) => scalar_string(value).unwrap_or_else(|value| {
                self.set_aside(field, value);
                String::new()
            }),
        };
        self.out.insert(field.into(), Value::String(value));
        self
    }

    /// Like `string`, but absent and empty values leave the field out.
    fn optional_string(&mut self, field: &str) -> &mut Self {
        let value = match self.source.remove(field) {
            None | Some(Value::Null) => None,
            Some(value) => match scalar_string(value) {
                Ok(s) => Some(s),
                Err(value) => {
                    self.set_aside(field, value);
                    None
                }
            },
        };
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.out.insert(field.into(), Value::String(value));
        }
        self
    }

    /// Numbers or numeric strings; anything negative counts as zero.
    fn hours(&mut self) -> &mut Self {
        let hours = match self.source.remove("hours") {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(hours) => hours,
                Err(_) => {
                    self.set_aside("hours", Value::String(s));
                    0.0
                }
            },
            Some(other) => {
                self.set_aside("hours", other);
                0.0
            }
        };
        let hours = if hours.is_finite() && hours > 0.0 { hours } else { 0.0 };
        self.out.insert("hours".into(), Value::from(hours));
        self
    }

    fn school_level(&mut self, field: &str) -> &mut Self {
        let level = match self.source.remove(field) {
            Some(Value::String(level)) if level == LEGACY_ELEMENTARY => "Primary".to_string(),
            Some(Value::String(level)) if !level.is_empty() => level,
            None | Some(Value::Null) | Some(Value::String(_)) => DEFAULT_SCHOOL_LEVEL.to_string(),
            Some(other) => {
                self.set_aside(field, other);
                DEFAULT_SCHOOL_LEVEL.to_string()
            }
        };
        self.out.insert(field.into(), Value::String(level));
        self
    }

    fn string_list(&mut self, field: &str) -> &mut Self {
        let items = match self.source.remove(field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(single @ (Value::String(_) | Value::Number(_))) => vec![single],
            Some(other) => {
                self.set_aside(field, other);
                Vec::new()
            }
        };
        let mut list = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Null => {}
                item => match scalar_string(item) {
                    Ok(s) => list.push(Value::String(s)),
                    Err(item) => self.set_aside(field, item),
                },
            }
        }
        self.out.insert(field.into(), Value::Array(list));
        self
    }

    fn finish(self) -> Value {
        let mut out = self.out;
        out.extend(self.source);
        Value::Object(out)
    }
}

/// The stored id, or one derived from the entity's position and content.
fn entity_id(collection: &str, index: usize, source: &mut Map<String, Value>) -> String {
    match source.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(n)) => n.to_string(),
        stored => {
            if let Some(stored) = stored.filter(|v| !v.is_null() && v.as_str() != Some("")) {
                source.insert("legacyId".into(), stored);
            }
            let name = format!("{}/{}/{}", collection, index, Value::Object(source.clone()));
            Uuid::new_v5(&LEGACY_ID_NAMESPACE, name.as_bytes()).to_string()
        }
    }
}

//=========================================================================================
// Top-level field normalizers
//=========================================================================================

/// Known levels are matched case-insensitively; any other value is kept as is.
fn normalize_progress(value: Option<Value>, unrecognized: &mut Unrecognized) -> Value {
    let map = match value {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => return Value::Object(Map::new()),
        Some(other) => {
            warn!("Progress is not an object ({}), keeping it aside", kind(&other));
            unrecognized.keep("progress", other);
            return Value::Object(Map::new());
        }
    };
    let mut out = Map::new();
    for (competency_id, level) in map {
        match level.as_str().and_then(AttainmentLevel::parse_lenient) {
            Some(known) => {
                out.insert(competency_id, Value::String(known.as_str().to_string()));
            }
            None if level.is_null() => {}
            None => {
                debug!("Carrying unrecognized level {} for {}", level, competency_id);
                out.insert(competency_id, level);
            }
        }
    }
    Value::Object(out)
}

fn normalize_reflections(value: Option<Value>, unrecognized: &mut Unrecognized) -> Value {
    let map = match value {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => return Value::Object(Map::new()),
        Some(other) => {
            unrecognized.keep("competencyReflections", other);
            return Value::Object(Map::new());
        }
    };
    let mut out = Map::new();
    for (competency_id, text) in map {
        if text.is_null() {
            continue;
        }
        match scalar_string(text) {
            Ok(text) => {
                out.insert(competency_id, Value::String(text));
            }
            Err(text) => {
                let mut misfit = Map::new();
                misfit.insert(competency_id, text);
                unrecognized.keep("competencyReflections", Value::Object(misfit));
            }
        }
    }
    Value::Object(out)
}

fn normalize_primary_setting(value: Option<Value>, unrecognized: &mut Unrecognized) -> Value {
    match value {
        Some(Value::String(setting)) if setting == "Primary" || setting == "Secondary" => {
            Value::String(setting)
        }
        None | Some(Value::Null) => Value::String(DEFAULT_PRIMARY_SETTING.to_string()),
        Some(Value::String(setting)) if setting == LEGACY_ELEMENTARY => {
            Value::String(DEFAULT_PRIMARY_SETTING.to_string())
        }
        Some(other) => {
            warn!("Unrecognized primary setting {}, using {}", other, DEFAULT_PRIMARY_SETTING);
            unrecognized.keep("primarySetting", other);
            Value::String(DEFAULT_PRIMARY_SETTING.to_string())
        }
    }
}

fn normalize_profile(value: Option<Value>, unrecognized: &mut Unrecognized) -> Option<Value> {
    let mut map = match value {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => return None,
        Some(other) => {
            unrecognized.keep("userProfile", other);
            return None;
        }
    };
    let mut out = Map::new();
    for field in ["name", "email", "photoURL"] {
        let value = match map.remove(field) {
            None | Some(Value::Null) => Value::Null,
            Some(value) => scalar_string(value).map(Value::String).unwrap_or_else(|value| {
                unrecognized.keep("userProfile", value);
                Value::Null
            }),
        };
        out.insert(field.into(), value);
    }
    if !map.is_empty() {
        unrecognized.keep("userProfile", Value::Object(map));
    }
    Some(Value::Object(out))
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Scalars read as text; anything else is handed back.
fn scalar_string(value: Value) -> Result<String, Value> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(other),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PrimarySetting, ProgressValue, SchoolLevel};
    use serde_json::json;

    fn remigrate(doc: &Document) -> Document {
        migrate(serde_json::to_value(doc).unwrap())
    }

    /// Shapes observed across client generations.
    fn fixtures() -> Vec<Value> {
        vec![
            json!({}),
            json!(null),
            json!([1, 2, 3]),
            json!("not a document"),
            // Earliest shape: logs, artifacts, progress only.
            json!({
                "logs": [{
                    "id": "l1", "date": "2024-09-03", "startTime": "08:00", "endTime": "12:00",
                    "hours": 4, "activity": "Shadowed principal", "location": "Oak Ridge",
                    "schoolLevel": "Elementary", "taggedCompetencyIds": ["A1", "F"],
                    "reflections": "", "artifactIds": []
                }],
                "artifacts": [{
                    "id": "a1", "name": "photo.jpg", "type": "image/jpeg",
                    "data": "data:image/jpeg;base64,/9j/", "uploadDate": "9/3/2024"
                }],
                "progress": {"A1": "Developing", "F": "EXEMPLARY", "G": "Mastered"}
            }),
            // Shelves and sites added; preference still on the retired value.
            json!({
                "logs": null,
                "artifacts": [],
                "progress": {},
                "shelves": [{"id": "s1", "name": "Budget"}],
                "sites": [
                    {"id": "x1", "name": "Lincoln Elementary", "level": "Elementary", "mentorName": "Kim"},
                    {"id": "x2", "name": "Harbor Academy", "level": "Charter", "mentorName": "Poe"}
                ],
                "competencyReflections": {"A": "Growing.", "B": 7},
                "primarySetting": "Elementary"
            }),
            // Current shape with a profile snapshot and a few mistyped fields.
            json!({
                "logs": [
                    {"id": "l2", "hours": "3.5", "activity": "Budget review", "schoolLevel": "Alternate",
                     "title": "Q3 budget", "taggedCompetencyIds": ["B5", 9]},
                    {"hours": -2, "activity": "No id yet"},
                    42
                ],
                "artifacts": [{"id": "a2", "shelfId": "s1", "name": "plan.pdf"}],
                "progress": "corrupt",
                "shelves": [{"id": "s1", "name": "Budget"}],
                "sites": [],
                "competencyReflections": {},
                "primarySetting": "Primary",
                "userProfile": {"name": "Dana", "email": "dana@example.edu", "photoURL": null},
                "legacyFlag": true
            }),
        ]
    }

    #[test]
    fn migration_is_total_and_fills_every_collection() {
        for fixture in fixtures() {
            let value = migrate_value(fixture);
            for field in [
                "logs",
                "artifacts",
                "progress",
                "shelves",
                "sites",
                "competencyReflections",
                "primarySetting",
            ] {
                assert!(
                    value.get(field).is_some_and(|v| !v.is_null()),
                    "missing {field} in {value}"
                );
            }
            // And the normalized shape always deserializes.
            serde_json::from_value::<Document>(value).expect("normalized shape deserializes");
        }
    }

    #[test]
    fn migration_is_idempotent() {
        for fixture in fixtures() {
            let once = migrate(fixture);
            let twice = remigrate(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn migration_is_deterministic_for_entities_without_ids() {
        let raw = json!({
            "logs": [
                {"activity": "legacy, no id", "hours": 2},
                {"activity": "legacy, no id", "hours": 2}
            ],
            "shelves": [{"name": "Budget", "id": ""}]
        });
        let first = migrate(raw.clone());
        let second = migrate(raw);
        assert_eq!(first, second);
        assert_ne!(first.logs[0].id, first.logs[1].id);
        assert!(!first.shelves[0].id.is_empty());
        assert_eq!(remigrate(&first), first);
    }

    #[test]
    fn empty_object_becomes_empty_skeleton() {
        let doc = migrate(json!({}));
        assert_eq!(doc, Document::default());
        assert_eq!(doc.primary_setting, PrimarySetting::Secondary);
    }

    #[test]
    fn retired_elementary_level_is_relabelled() {
        let docs = fixtures();
        let early = migrate(docs[4].clone());
        assert_eq!(early.logs[0].school_level, SchoolLevel::Primary);
        assert_eq!(early.logs[0].tagged_competency_ids, vec!["A1", "F"]);

        let with_sites = migrate(docs[5].clone());
        assert_eq!(with_sites.sites[0].level, SchoolLevel::Primary);
        assert_eq!(with_sites.primary_setting, PrimarySetting::Secondary);
        assert!(with_sites.extra.get(UNRECOGNIZED_KEY).is_none());
    }

    #[test]
    fn unrecognized_levels_pass_through() {
        let doc = migrate(fixtures()[5].clone());
        assert_eq!(doc.sites[1].level, SchoolLevel::Other("Charter".into()));
        assert_eq!(
            serde_json::to_value(&doc).unwrap()["sites"][1]["level"],
            json!("Charter")
        );
    }

    #[test]
    fn progress_levels_are_matched_leniently_and_unknown_ones_kept() {
        let doc = migrate(fixtures()[4].clone());
        assert_eq!(doc.level_of("A1"), Some(AttainmentLevel::Developing));
        assert_eq!(doc.level_of("F"), Some(AttainmentLevel::Exemplary));
        assert_eq!(doc.level_of("G"), None);
        assert_eq!(doc.progress["G"], ProgressValue::Other(json!("Mastered")));
    }

    #[test]
    fn nothing_is_lost_across_load_and_save() {
        let raw = json!({
            "progress": {"A1": "Developing", "G": "Mastered"},
            "futureField": {"x": 1},
            "logs": [{"id": "l1", "activity": "Walkthrough", "mood": "good"}],
            "sites": [{"id": "x1", "name": "Oak", "level": "Primary", "mentorName": "Ng", "district": 12}]
        });
        let doc = migrate(raw);
        let saved = serde_json::to_value(&doc).unwrap();

        assert_eq!(saved["progress"]["G"], json!("Mastered"));
        assert_eq!(saved["progress"]["A1"], json!("Developing"));
        assert_eq!(saved["futureField"], json!({"x": 1}));
        assert_eq!(saved["logs"][0]["mood"], json!("good"));
        assert_eq!(saved["sites"][0]["district"], json!(12));
        assert_eq!(migrate(saved), doc);
    }

    #[test]
    fn misplaced_values_are_kept_aside() {
        let doc = migrate(fixtures()[6].clone());
        // The bare number is not an entity; both objects survive.
        assert_eq!(doc.logs.len(), 2);
        assert_eq!(doc.logs[0].hours, 3.5);
        assert_eq!(doc.logs[0].title.as_deref(), Some("Q3 budget"));
        assert_eq!(doc.logs[0].tagged_competency_ids, vec!["B5", "9"]);
        assert_eq!(doc.logs[1].hours, 0.0);
        assert!(!doc.logs[1].id.is_empty());
        assert_eq!(doc.artifacts[0].shelf_id.as_deref(), Some("s1"));
        assert!(doc.progress.is_empty());
        assert_eq!(doc.primary_setting, PrimarySetting::Primary);
        let profile = doc.user_profile.clone().expect("profile kept");
        assert_eq!(profile.name.as_deref(), Some("Dana"));
        assert_eq!(profile.photo_url, None);

        assert_eq!(doc.extra["legacyFlag"], json!(true));
        let kept = &doc.extra[UNRECOGNIZED_KEY];
        assert_eq!(kept["logs"], json!([42]));
        assert_eq!(kept["progress"], json!(["corrupt"]));
    }

    #[test]
    fn unreadable_entity_fields_are_kept_aside() {
        let doc = migrate(json!({
            "logs": [{"id": "l1", "activity": {"text": "nested"}, "hours": "a while"}]
        }));
        assert_eq!(doc.logs[0].activity, "");
        assert_eq!(doc.logs[0].hours, 0.0);
        assert_eq!(
            doc.extra[UNRECOGNIZED_KEY]["logs"],
            json!([
                {"id": "l1", "field": "hours", "value": "a while"},
                {"id": "l1", "field": "activity", "value": {"text": "nested"}}
            ])
        );
        assert_eq!(remigrate(&doc), doc);
    }

    #[test]
    fn non_object_document_is_kept_aside() {
        let doc = migrate(json!([1, 2, 3]));
        assert!(doc.logs.is_empty());
        assert_eq!(doc.extra[UNRECOGNIZED_KEY]["document"], json!([[1, 2, 3]]));
    }

    #[test]
    fn scalar_reflections_are_read_as_text() {
        let doc = migrate(fixtures()[5].clone());
        assert_eq!(doc.competency_reflections.len(), 2);
        assert_eq!(doc.competency_reflections["A"], "Growing.");
        assert_eq!(doc.competency_reflections["B"], "7");
    }
}
