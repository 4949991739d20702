//! Timeouts and budgets for page snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotConfig {
    /// Page-load timeout; on expiry the snapshot continues with what loaded.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Network-quiescence wait; on expiry extraction proceeds anyway.
    #[serde(default = "default_quiescence_timeout_ms")]
    pub quiescence_timeout_ms: u64,

    /// Timeout for each in-page script evaluation.
    #[serde(default = "default_evaluation_timeout_ms")]
    pub evaluation_timeout_ms: u64,

    /// Maximum collapsed sections clicked open per page.
    #[serde(default = "default_max_accordion_clicks")]
    pub max_accordion_clicks: usize,

    /// Total time budget for accordion expansion.
    #[serde(default = "default_accordion_budget_ms")]
    pub accordion_budget_ms: u64,

    /// Settle delay after each accordion click.
    #[serde(default = "default_accordion_settle_ms")]
    pub accordion_settle_ms: u64,

    /// Rows whose preview control may be clicked to discover a URL.
    #[serde(default = "default_max_click_resolutions")]
    pub max_click_resolutions: usize,

    /// Infer URLs for remaining rows from a clicked row's URL. Assumes all
    /// rows on the page share one URL shape.
    #[serde(default = "default_true")]
    pub infer_from_clicks: bool,

    /// Pages visited per course (course page plus linked sections).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Largest intercepted JSON body kept for the id maps.
    #[serde(default = "default_max_intercept_body_bytes")]
    pub max_intercept_body_bytes: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            quiescence_timeout_ms: default_quiescence_timeout_ms(),
            evaluation_timeout_ms: default_evaluation_timeout_ms(),
            max_accordion_clicks: default_max_accordion_clicks(),
            accordion_budget_ms: default_accordion_budget_ms(),
            accordion_settle_ms: default_accordion_settle_ms(),
            max_click_resolutions: default_max_click_resolutions(),
            infer_from_clicks: default_true(),
            max_pages: default_max_pages(),
            max_intercept_body_bytes: default_max_intercept_body_bytes(),
        }
    }
}

impl SnapshotConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn quiescence_timeout(&self) -> Duration {
        Duration::from_millis(self.quiescence_timeout_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn accordion_budget(&self) -> Duration {
        Duration::from_millis(self.accordion_budget_ms)
    }

    pub fn accordion_settle(&self) -> Duration {
        Duration::from_millis(self.accordion_settle_ms)
    }
}

fn default_navigation_timeout_ms() -> u64 {
    15_000
}
fn default_quiescence_timeout_ms() -> u64 {
    5_000
}
fn default_evaluation_timeout_ms() -> u64 {
    10_000
}
fn default_max_accordion_clicks() -> usize {
    20
}
fn default_accordion_budget_ms() -> u64 {
    1_000
}
fn default_accordion_settle_ms() -> u64 {
    50
}
fn default_max_click_resolutions() -> usize {
    2
}
fn default_true() -> bool {
    true
}
fn default_max_pages() -> usize {
    8
}
fn default_max_intercept_body_bytes() -> usize {
    200_000
}
