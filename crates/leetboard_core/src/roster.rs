use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const ROLLS_FILENAME: &str = "roll.txt";
pub const NAMES_FILENAME: &str = "name.txt";
pub const URLS_FILENAME: &str = "urls.txt";
pub const SECTIONS_FILENAME: &str = "sections.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub roll: String,
    pub name: String,
    pub url: String,
    pub section: String,
}

/// Locations of the four line-oriented roster lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterPaths {
    pub rolls: PathBuf,
    pub names: PathBuf,
    pub urls: PathBuf,
    pub sections: PathBuf,
}

impl RosterPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            rolls: dir.join(ROLLS_FILENAME),
            names: dir.join(NAMES_FILENAME),
            urls: dir.join(URLS_FILENAME),
            sections: dir.join(SECTIONS_FILENAME),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.rolls, &self.names, &self.urls, &self.sections]
    }
}

pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn zip_roster(
    rolls: Vec<String>,
    names: Vec<String>,
    urls: Vec<String>,
    sections: Vec<String>,
) -> Result<Vec<RosterEntry>> {
    if rolls.len() != names.len() || names.len() != urls.len() || names.len() != sections.len() {
        bail!(
            "roster length mismatch: rolls={} names={} urls={} sections={}",
            rolls.len(),
            names.len(),
            urls.len(),
            sections.len()
        );
    }

    Ok(rolls
        .into_iter()
        .zip(names)
        .zip(urls)
        .zip(sections)
        .map(|(((roll, name), url), section)| RosterEntry {
            roll,
            name,
            url,
            section,
        })
        .collect())
}

pub fn load_roster(paths: &RosterPaths) -> Result<Vec<RosterEntry>> {
    let rolls = read_list(&paths.rolls)?;
    let names = read_list(&paths.names)?;
    let urls = read_list(&paths.urls)?;
    let sections = read_list(&paths.sections)?;
    zip_roster(rolls, names, urls, sections)
}

fn read_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read roster list {}", path.display()))?;
    Ok(parse_lines(&content))
}
