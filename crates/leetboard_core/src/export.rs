use anyhow::{Context, Result};

use crate::record::{StatSnapshot, StudentRecord};

pub const CSV_HEADER: [&str; 9] = [
    "Rank",
    "Roll Number",
    "Name",
    "Section",
    "Total Solved",
    "Easy",
    "Medium",
    "Hard",
    "Profile URL",
];

/// Render snapshot rows as CSV, optionally keeping a single section.
///
/// Rank is the 1-based position among the exported rows, so it follows the
/// snapshot order (pinned first).
pub fn render_csv(records: &[StudentRecord], section: Option<&str>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .context("failed to write CSV header")?;

    let rows = records
        .iter()
        .filter(|record| section.is_none_or(|section| record.section == section));
    for (index, record) in rows.enumerate() {
        let count = |pick: fn(&StatSnapshot) -> u64| {
            record
                .stats
                .as_ref()
                .map(|stats| pick(stats).to_string())
                .unwrap_or_default()
        };
        writer
            .write_record([
                (index + 1).to_string(),
                record.roll.clone(),
                record.name.clone(),
                record.section.clone(),
                count(|stats| stats.total_solved),
                count(|stats| stats.easy_solved),
                count(|stats| stats.medium_solved),
                count(|stats| stats.hard_solved),
                record.url.clone(),
            ])
            .with_context(|| format!("failed to write CSV row for {}", record.roll))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| anyhow::anyhow!("failed to flush CSV output: {error}"))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}
