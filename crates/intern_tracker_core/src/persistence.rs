//! crates/intern_tracker_core/src/persistence.rs
//!
//! Decides when the in-memory document should be written to the remote store.
//!
//! The controller owns no timers and does no I/O. The caller feeds it the
//! current time and the current document, asks it whether a save is due, runs
//! the write itself, and reports the outcome back. That keeps debouncing,
//! flushing, and retry behaviour deterministic and testable.

use crate::domain::Document;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_ERROR_DISPLAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSettings {
    /// Quiet period after the last mutation before a save is attempted.
    pub idle_window: Duration,
    /// How long a save failure stays visible before it clears itself.
    pub error_display: Duration,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            idle_window: DEFAULT_IDLE_WINDOW,
            error_display: DEFAULT_ERROR_DISPLAY,
        }
    }
}

/// Observable save state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    PendingWrite,
    Saving,
    Error,
}

/// Events that force an immediate save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    Hidden,
    Blur,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub message: String,
    pub visible_until: Instant,
}

/// A write the caller should perform now.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub owner: Uuid,
    pub snapshot: Document,
}

#[derive(Debug)]
pub struct PersistenceController {
    settings: SaveSettings,
    loading: bool,
    editable: bool,
    owner: Option<Uuid>,
    dirty: bool,
    deadline: Option<Instant>,
    flush_requested: bool,
    in_flight: bool,
    last_saved: Option<Document>,
    failure: Option<SaveFailure>,
}

impl PersistenceController {
    /// A controller for a session that is still loading.
    pub fn new(settings: SaveSettings) -> Self {
        Self {
            settings,
            loading: true,
            editable: false,
            owner: None,
            dirty: false,
            deadline: None,
            flush_requested: false,
            in_flight: false,
            last_saved: None,
            failure: None,
        }
    }

    /// Ends the loading phase. `owner` is `Some` only for editor sessions.
    ///
    /// The loaded document counts as already saved.
    pub fn mark_loaded(&mut self, owner: Option<Uuid>, loaded: &Document) {
        self.loading = false;
        self.editable = owner.is_some();
        self.owner = owner;
        self.last_saved = Some(loaded.clone());
        self.dirty = false;
        self.deadline = None;
        self.flush_requested = false;
    }

    /// Marks the remote copy as out of date right after loading, e.g. when the
    /// load stamped a new profile snapshot onto the document.
    pub fn mark_stale(&mut self, now: Instant) {
        if !self.can_save() {
            return;
        }
        self.last_saved = None;
        self.dirty = true;
        self.deadline = Some(now + self.settings.idle_window);
    }

    /// Drops the bound identity, e.g. after sign-out. Nothing is saved afterwards.
    pub fn unbind(&mut self) {
        self.owner = None;
        self.editable = false;
        self.dirty = false;
        self.deadline = None;
        self.flush_requested = false;
    }

    fn can_save(&self) -> bool {
        !self.loading && self.editable && self.owner.is_some()
    }

    /// Records that the document changed. Each call restarts the idle timer.
    ///
    /// Returns whether the change is now pending a write.
    pub fn record_change(&mut self, current: &Document, now: Instant) -> bool {
        if !self.can_save() {
            return false;
        }
        if self.last_saved.as_ref() == Some(current) {
            self.dirty = false;
            self.deadline = None;
            self.flush_requested = false;
            return false;
        }
        self.dirty = true;
        self.deadline = Some(now + self.settings.idle_window);
        true
    }

    /// Asks for a save right away, bypassing the idle timer.
    pub fn request_flush(&mut self, _trigger: FlushTrigger) -> bool {
        if self.can_save() && self.dirty {
            self.flush_requested = true;
        }
        self.flush_requested
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.can_save()
            && self.dirty
            && !self.in_flight
            && (self.flush_requested || self.deadline.is_some_and(|d| d <= now))
    }

    /// Starts a save if one is due, cancelling the pending timer.
    pub fn begin_save(&mut self, current: &Document, now: Instant) -> Option<SaveRequest> {
        if !self.is_due(now) {
            return None;
        }
        let owner = self.owner?;
        if self.last_saved.as_ref() == Some(current) {
            self.dirty = false;
            self.deadline = None;
            self.flush_requested = false;
            return None;
        }
        self.in_flight = true;
        self.flush_requested = false;
        self.deadline = None;
        Some(SaveRequest {
            owner,
            snapshot: current.clone(),
        })
    }

    /// Reports how a write started by `begin_save` ended.
    ///
    /// On failure the change stays pending and the idle timer is rearmed, so
    /// the next timer expiry or flush retries with the latest document.
    pub fn complete_save(
        &mut self,
        snapshot: Document,
        outcome: Result<(), String>,
        current: &Document,
        now: Instant,
    ) {
        self.in_flight = false;
        match outcome {
            Ok(()) => {
                self.failure = None;
                self.dirty = current != &snapshot;
                self.last_saved = Some(snapshot);
                if !self.dirty {
                    self.deadline = None;
                    self.flush_requested = false;
                } else if self.deadline.is_none() && !self.flush_requested {
                    self.deadline = Some(now + self.settings.idle_window);
                }
            }
            Err(message) => {
                self.failure = Some(SaveFailure {
                    message,
                    visible_until: now + self.settings.error_display,
                });
                if self.deadline.is_none() {
                    self.deadline = Some(now + self.settings.idle_window);
                }
            }
        }
    }

    pub fn failure(&self) -> Option<&SaveFailure> {
        self.failure.as_ref()
    }

    pub fn dismiss_error(&mut self) {
        self.failure = None;
    }

    /// Clears a failure whose display time is over. Returns whether one was cleared.
    pub fn clear_expired_error(&mut self, now: Instant) -> bool {
        match &self.failure {
            Some(failure) if failure.visible_until <= now => {
                self.failure = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_pending_change(&self) -> bool {
        self.dirty
    }

    pub fn state(&self, now: Instant) -> SyncState {
        if self.in_flight {
            SyncState::Saving
        } else if self.failure.as_ref().is_some_and(|f| f.visible_until > now) {
            SyncState::Error
        } else if self.dirty && self.can_save() {
            SyncState::PendingWrite
        } else {
            SyncState::Idle
        }
    }

    /// The next instant at which the controller has something to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let save_at = if self.can_save() && self.dirty && !self.in_flight {
            self.deadline
        } else {
            None
        };
        let clear_at = self.failure.as_ref().map(|f| f.visible_until);
        match (save_at, clear_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogEntry, Site, SchoolLevel};

    fn settings() -> SaveSettings {
        SaveSettings {
            idle_window: Duration::from_secs(10),
            error_display: Duration::from_secs(3),
        }
    }

    fn editor(now: Instant) -> (PersistenceController, Document, Uuid) {
        let owner = Uuid::new_v4();
        let doc = Document::default();
        let mut controller = PersistenceController::new(settings());
        controller.mark_loaded(Some(owner), &doc);
        assert_eq!(controller.state(now), SyncState::Idle);
        (controller, doc, owner)
    }

    fn with_log(doc: &Document, id: &str) -> Document {
        let mut next = doc.clone();
        next.logs.push(LogEntry {
            id: id.to_string(),
            hours: 1.0,
            ..LogEntry::default()
        });
        next
    }

    #[test]
    fn burst_of_mutations_coalesces_into_one_write() {
        let t0 = Instant::now();
        let (mut controller, mut doc, owner) = editor(t0);
        let mut writes = Vec::new();

        for i in 0..5u64 {
            let now = t0 + Duration::from_secs(i * 2);
            doc = with_log(&doc, &format!("log-{i}"));
            assert!(controller.record_change(&doc, now));
            assert!(controller.begin_save(&doc, now).is_none());
        }
        assert_eq!(controller.state(t0 + Duration::from_secs(8)), SyncState::PendingWrite);

        // Last change at t0+8s, so the window closes at t0+18s.
        assert!(controller.begin_save(&doc, t0 + Duration::from_secs(17)).is_none());
        let due = t0 + Duration::from_secs(18);
        assert_eq!(controller.next_wakeup(), Some(due));
        let request = controller.begin_save(&doc, due).expect("save due");
        assert_eq!(request.owner, owner);
        assert_eq!(controller.state(due), SyncState::Saving);
        writes.push(request.snapshot.clone());
        controller.complete_save(request.snapshot, Ok(()), &doc, due);

        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].logs.len(), 5);
        assert_eq!(controller.state(due), SyncState::Idle);
        assert_eq!(controller.next_wakeup(), None);
        assert!(controller.begin_save(&doc, due + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn flush_saves_immediately_and_cancels_the_timer() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        let doc = with_log(&doc, "a");
        controller.record_change(&doc, t0);

        let now = t0 + Duration::from_secs(1);
        assert!(controller.request_flush(FlushTrigger::Hidden));
        let request = controller.begin_save(&doc, now).expect("flush forces a save");
        assert_eq!(controller.next_wakeup(), None);
        controller.complete_save(request.snapshot, Ok(()), &doc, now);

        // The earlier deadline passing does not produce a second write.
        assert!(controller.begin_save(&doc, t0 + Duration::from_secs(11)).is_none());
    }

    #[test]
    fn flush_without_pending_change_does_nothing() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        assert!(!controller.request_flush(FlushTrigger::Teardown));
        assert!(controller.begin_save(&doc, t0).is_none());
    }

    #[test]
    fn unchanged_document_never_triggers_a_redundant_write() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        let changed = with_log(&doc, "a");
        controller.record_change(&changed, t0);
        // Reverting to the saved content clears the pending write.
        assert!(!controller.record_change(&doc, t0 + Duration::from_secs(1)));
        assert_eq!(controller.state(t0), SyncState::Idle);
        assert!(controller.begin_save(&doc, t0 + Duration::from_secs(30)).is_none());
    }

    #[test]
    fn failed_write_keeps_the_change_pending_and_retries() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        let first = with_log(&doc, "a");
        controller.record_change(&first, t0);
        controller.request_flush(FlushTrigger::Blur);
        let request = controller.begin_save(&first, t0).expect("flush");
        controller.complete_save(request.snapshot, Err("network down".into()), &first, t0);

        assert!(controller.has_pending_change());
        assert_eq!(controller.state(t0), SyncState::Error);
        assert_eq!(controller.failure().map(|f| f.message.as_str()), Some("network down"));

        // A later edit, then a flush, persists the latest document.
        let latest = with_log(&first, "b");
        let t1 = t0 + Duration::from_secs(1);
        controller.record_change(&latest, t1);
        controller.request_flush(FlushTrigger::Hidden);
        let retry = controller.begin_save(&latest, t1).expect("retry");
        assert_eq!(retry.snapshot, latest);
        controller.complete_save(retry.snapshot, Ok(()), &latest, t1);
        assert!(!controller.has_pending_change());
        assert!(controller.failure().is_none());
    }

    #[test]
    fn failed_write_retries_on_the_rearmed_timer() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        let doc = with_log(&doc, "a");
        controller.record_change(&doc, t0);
        let due = t0 + Duration::from_secs(10);
        let request = controller.begin_save(&doc, due).expect("due");
        controller.complete_save(request.snapshot, Err("timeout".into()), &doc, due);

        // The error clears first, then the retry comes due.
        assert_eq!(controller.next_wakeup(), Some(due + Duration::from_secs(3)));
        assert!(controller.clear_expired_error(due + Duration::from_secs(3)));
        assert_eq!(controller.state(due + Duration::from_secs(3)), SyncState::PendingWrite);
        assert!(controller
            .begin_save(&doc, due + Duration::from_secs(10))
            .is_some());
    }

    #[test]
    fn mutation_during_save_stays_pending() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        let first = with_log(&doc, "a");
        controller.record_change(&first, t0);
        controller.request_flush(FlushTrigger::Hidden);
        let request = controller.begin_save(&first, t0).expect("flush");

        let second = with_log(&first, "b");
        controller.record_change(&second, t0 + Duration::from_secs(1));
        assert_eq!(controller.state(t0), SyncState::Saving);
        controller.complete_save(request.snapshot, Ok(()), &second, t0 + Duration::from_secs(2));

        assert!(controller.has_pending_change());
        assert_eq!(controller.next_wakeup(), Some(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn dismissing_the_error_clears_it() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        let doc = with_log(&doc, "a");
        controller.record_change(&doc, t0);
        controller.request_flush(FlushTrigger::Hidden);
        let request = controller.begin_save(&doc, t0).expect("flush");
        controller.complete_save(request.snapshot, Err("denied".into()), &doc, t0);
        controller.dismiss_error();
        assert_eq!(controller.state(t0), SyncState::PendingWrite);
    }

    #[test]
    fn stale_load_is_saved_after_the_idle_window() {
        let t0 = Instant::now();
        let (mut controller, doc, _) = editor(t0);
        controller.mark_stale(t0);
        assert_eq!(controller.state(t0), SyncState::PendingWrite);
        assert!(controller.begin_save(&doc, t0 + Duration::from_secs(10)).is_some());
    }

    #[test]
    fn nothing_is_saved_while_loading_viewing_or_signed_out() {
        let t0 = Instant::now();
        let mut doc = Document::default();
        doc.sites.push(Site {
            id: "s".into(),
            name: "Lincoln Middle".into(),
            level: SchoolLevel::Secondary,
            mentor_name: "R. Díaz".into(),
            ..Site::default()
        });

        let mut loading = PersistenceController::new(settings());
        assert!(!loading.record_change(&doc, t0));
        assert!(!loading.request_flush(FlushTrigger::Hidden));

        let mut viewer = PersistenceController::new(settings());
        viewer.mark_loaded(None, &Document::default());
        assert!(!viewer.record_change(&doc, t0));
        assert!(viewer.begin_save(&doc, t0 + Duration::from_secs(60)).is_none());

        let (mut signed_out, _, _) = editor(t0);
        signed_out.unbind();
        assert!(!signed_out.record_change(&doc, t0));
        assert_eq!(signed_out.state(t0), SyncState::Idle);
    }
}
