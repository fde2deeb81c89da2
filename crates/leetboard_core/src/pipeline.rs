use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::fetch::{FetchStatus, StatsSource, fetch_record};
use crate::merge::order_records;
use crate::pins::PinStore;
use crate::roster::{RosterPaths, load_roster};
use crate::runtime::ResolvedPaths;
use crate::snapshot::write_snapshot;

/// Everything one refresh cycle reads and writes.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub roster: RosterPaths,
    pub pins_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub profile_prefix: String,
}

impl CyclePlan {
    pub fn from_paths(paths: &ResolvedPaths, profile_prefix: &str) -> Self {
        Self {
            roster: paths.roster.clone(),
            pins_path: paths.pins_path.clone(),
            snapshot_path: paths.snapshot_path.clone(),
            profile_prefix: profile_prefix.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub students: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pinned: usize,
}

/// Run load -> fetch -> merge -> persist once.
///
/// A roster error aborts before anything is written; per-student fetch
/// failures only leave that student without stats.
pub fn run_cycle(plan: &CyclePlan, source: &dyn StatsSource) -> Result<CycleReport> {
    run_cycle_until(plan, source, &|| false)
}

/// Like [`run_cycle`], but checks `cancelled` before each fetch. A cancelled
/// cycle writes nothing.
pub fn run_cycle_until(
    plan: &CyclePlan,
    source: &dyn StatsSource,
    cancelled: &dyn Fn() -> bool,
) -> Result<CycleReport> {
    let started = Instant::now();
    let roster = load_roster(&plan.roster).context("refresh aborted, keeping previous snapshot")?;
    info!(students = roster.len(), "roster loaded");

    let pins = PinStore::new(&plan.pins_path).read();

    let mut report = CycleReport {
        students: roster.len(),
        ..CycleReport::default()
    };
    let mut records = Vec::with_capacity(roster.len());
    for (index, entry) in roster.into_iter().enumerate() {
        if cancelled() {
            bail!(
                "refresh cancelled after {index} of {} students, keeping previous snapshot",
                report.students
            );
        }
        let pinned = pins.contains(&entry.roll);
        let outcome = fetch_record(entry, pinned, source, &plan.profile_prefix);
        match outcome.status {
            FetchStatus::Fetched => report.fetched += 1,
            FetchStatus::Skipped => report.skipped += 1,
            FetchStatus::Failed => report.failed += 1,
        }
        if outcome.record.pinned {
            report.pinned += 1;
        }
        records.push(outcome.record);
    }

    let records = order_records(records);
    write_snapshot(&plan.snapshot_path, &records)?;
    info!(
        students = report.students,
        fetched = report.fetched,
        skipped = report.skipped,
        failed = report.failed,
        pinned = report.pinned,
        elapsed_ms = started.elapsed().as_millis() as u64,
        path = %plan.snapshot_path.display(),
        "snapshot written"
    );
    Ok(report)
}
