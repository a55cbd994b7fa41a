//! crates/intern_tracker_core/src/summary.rs
//!
//! Dashboard aggregates computed from a document.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::ALL_COMPETENCIES;
use crate::domain::{AttainmentLevel, Document, PrimarySetting, ProgressValue};

/// Internship hours required for the license.
pub const TARGET_HOURS: f64 = 320.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub activity: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_hours: f64,
    pub target_hours: f64,
    pub progress_percent: u32,
    pub competencies_tracked: usize,
    pub competencies_total: usize,
    pub level_counts: BTreeMap<AttainmentLevel, usize>,
    pub hours_by_level: BTreeMap<String, f64>,
    pub primary_setting: PrimarySetting,
    pub most_recent: Option<RecentActivity>,
}

impl DashboardSummary {
    pub fn from_document(doc: &Document) -> Self {
        let total_hours: f64 = doc.logs.iter().map(|l| l.hours).sum();
        let progress_percent = ((total_hours / TARGET_HOURS) * 100.0).round().clamp(0.0, 100.0) as u32;

        let mut level_counts: BTreeMap<AttainmentLevel, usize> =
            AttainmentLevel::ALL.into_iter().map(|l| (l, 0)).collect();
        for level in doc.progress.values().filter_map(ProgressValue::level) {
            *level_counts.entry(level).or_default() += 1;
        }

        let mut hours_by_level: BTreeMap<String, f64> = BTreeMap::new();
        for log in &doc.logs {
            *hours_by_level
                .entry(log.school_level.as_str().to_string())
                .or_default() += log.hours;
        }

        // Entry order, not date order: the last log entered is the most recent.
        let most_recent = doc.logs.last().map(|l| RecentActivity {
            activity: l.activity.clone(),
            date: l.date.clone(),
        });

        Self {
            total_hours,
            target_hours: TARGET_HOURS,
            progress_percent,
            competencies_tracked: level_counts.values().sum(),
            competencies_total: ALL_COMPETENCIES.len(),
            level_counts,
            hours_by_level,
            primary_setting: doc.primary_setting,
            most_recent,
        }
    }
}
