use serde::{Deserialize, Serialize};

use crate::roster::RosterEntry;

pub const NO_EXTERNAL_DATA_INFO: &str = "No LeetCode data available";

/// Accepted-submission counts by difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSnapshot {
    pub total_solved: u64,
    pub easy_solved: u64,
    pub medium_solved: u64,
    pub hard_solved: u64,
}

/// One row of the published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub roll: String,
    pub name: String,
    pub url: String,
    pub section: String,
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl StudentRecord {
    pub fn from_entry(entry: RosterEntry, pinned: bool) -> Self {
        Self {
            roll: entry.roll,
            name: entry.name,
            url: entry.url,
            section: entry.section,
            pinned,
            username: None,
            stats: None,
            info: None,
        }
    }

    /// Sort key; records without stats rank as zero.
    pub fn total_solved(&self) -> u64 {
        self.stats.map(|stats| stats.total_solved).unwrap_or(0)
    }
}
