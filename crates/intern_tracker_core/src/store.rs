//! crates/intern_tracker_core/src/store.rs
//!
//! The in-memory State Store. Every change to a `Document` goes through a
//! `Mutation`, which maps the current document to a new one without touching
//! the old value.

use crate::domain::{
    new_entity_id, Artifact, AttainmentLevel, Document, LogEntry, NewSite, PrimarySetting, Shelf,
    Site,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// The fixed set of document mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddLog { entry: LogEntry },
    UpdateLog { entry: LogEntry },
    AddArtifact { artifact: Artifact },
    UpdateArtifact { artifact: Artifact },
    AddShelf { shelf: Shelf },
    AddSite { site: Site },
    RemoveSite { id: String },
    UpdateProgress { competency_id: String, level: AttainmentLevel },
    UpdateReflection { competency_id: String, text: String },
    SetPrimarySetting { value: PrimarySetting },
}

impl Mutation {
    /// Produces the document that results from applying this mutation.
    ///
    /// Updates for an id that isn't present leave the document unchanged. An
    /// add for an id that is already present replaces that entry in place, so
    /// each collection holds at most one entity per id.
    pub fn apply(&self, doc: &Document) -> Document {
        let mut next = doc.clone();
        match self {
            Mutation::AddLog { entry } => upsert_by_id(&mut next.logs, entry, |l| &l.id),
            Mutation::UpdateLog { entry } => {
                replace_by_id(&mut next.logs, entry, |l| &l.id);
            }
            Mutation::AddArtifact { artifact } => {
                upsert_by_id(&mut next.artifacts, artifact, |a| &a.id)
            }
            Mutation::UpdateArtifact { artifact } => {
                replace_by_id(&mut next.artifacts, artifact, |a| &a.id);
            }
            Mutation::AddShelf { shelf } => upsert_by_id(&mut next.shelves, shelf, |s| &s.id),
            Mutation::AddSite { site } => upsert_by_id(&mut next.sites, site, |s| &s.id),
            Mutation::RemoveSite { id } => next.sites.retain(|s| &s.id != id),
            Mutation::UpdateProgress { competency_id, level } => {
                next.progress.insert(competency_id.clone(), (*level).into());
            }
            Mutation::UpdateReflection { competency_id, text } => {
                next.competency_reflections
                    .insert(competency_id.clone(), text.clone());
            }
            Mutation::SetPrimarySetting { value } => next.primary_setting = *value,
        }
        next
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddLog { .. } => "add_log",
            Mutation::UpdateLog { .. } => "update_log",
            Mutation::AddArtifact { .. } => "add_artifact",
            Mutation::UpdateArtifact { .. } => "update_artifact",
            Mutation::AddShelf { .. } => "add_shelf",
            Mutation::AddSite { .. } => "add_site",
            Mutation::RemoveSite { .. } => "remove_site",
            Mutation::UpdateProgress { .. } => "update_progress",
            Mutation::UpdateReflection { .. } => "update_reflection",
            Mutation::SetPrimarySetting { .. } => "set_primary_setting",
        }
    }
}

fn replace_by_id<T: Clone>(items: &mut [T], updated: &T, id_of: impl Fn(&T) -> &String) -> bool {
    let id = id_of(updated);
    match items.iter_mut().find(|item| id_of(item) == id) {
        Some(slot) => {
            *slot = updated.clone();
            true
        }
        None => false,
    }
}

fn upsert_by_id<T: Clone>(items: &mut Vec<T>, entity: &T, id_of: impl Fn(&T) -> &String) {
    if !replace_by_id(items, entity, &id_of) {
        items.push(entity.clone());
    }
}

//=========================================================================================
// StateStore
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// Holds the current document for one session.
#[derive(Debug, Clone)]
pub struct StateStore {
    document: Document,
    version: u64,
    access: Access,
}

impl StateStore {
    pub fn new(document: Document, access: Access) -> Self {
        Self {
            document,
            version: 0,
            access,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Incremented once per applied mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }

    /// Applies a mutation. Returns `false` without changing anything when the
    /// store is read-only.
    pub fn apply(&mut self, mutation: &Mutation) -> bool {
        if self.is_read_only() {
            return false;
        }
        self.document = mutation.apply(&self.document);
        self.version += 1;
        true
    }

    /// Creates a shelf with a fresh id.
    pub fn add_shelf(&mut self, name: impl Into<String>) -> Option<Shelf> {
        let shelf = Shelf {
            id: new_entity_id(),
            name: name.into(),
            extra: Map::new(),
        };
        self.apply(&Mutation::AddShelf { shelf: shelf.clone() })
            .then_some(shelf)
    }

    /// Creates a site with a fresh id.
    pub fn add_site(&mut self, new_site: NewSite) -> Option<Site> {
        let site = Site {
            id: new_entity_id(),
            name: new_site.name,
            level: new_site.level,
            mentor_name: new_site.mentor_name,
            extra: Map::new(),
        };
        self.apply(&Mutation::AddSite { site: site.clone() })
            .then_some(site)
    }
}
