use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::render_default_config;
use crate::roster::RosterPaths;

pub const SNAPSHOT_FILENAME: &str = "data.json";
pub const PINS_FILENAME: &str = "pinned.json";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub roster: RosterPaths,
    pub pins_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub data_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\ndata_dir={} ({})\nconfig_path={} ({})\nroll_path={}\nname_path={}\nurl_path={}\nsection_path={}\npins_path={}\nsnapshot_path={}",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.data_dir),
            self.data_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.roster.rolls),
            normalize_for_display(&self.roster.names),
            normalize_for_display(&self.roster.urls),
            normalize_for_display(&self.roster.sections),
            normalize_for_display(&self.pins_path),
            normalize_for_display(&self.snapshot_path),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub roster_files_present: usize,
    pub pins_exists: bool,
    pub snapshot_exists: bool,
    pub snapshot_size_bytes: Option<u64>,
    pub config_exists: bool,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> Result<RuntimeStatus> {
    let mut warnings = Vec::new();
    let mut roster_files_present = 0;
    for path in paths.roster.all() {
        if path.exists() {
            roster_files_present += 1;
        } else {
            warnings.push(format!(
                "{} is missing; refresh cycles will abort until it exists",
                normalize_for_display(path)
            ));
        }
    }

    let snapshot_exists = paths.snapshot_path.exists();
    let snapshot_size_bytes = if snapshot_exists {
        let metadata = fs::metadata(&paths.snapshot_path)
            .with_context(|| format!("failed to inspect {}", paths.snapshot_path.display()))?;
        Some(metadata.len())
    } else {
        warnings.push("no snapshot yet; GET /data serves an empty array".to_string());
        None
    };

    Ok(RuntimeStatus {
        roster_files_present,
        pins_exists: paths.pins_path.exists(),
        snapshot_exists,
        snapshot_size_bytes,
        config_exists: paths.config_path.exists(),
        warnings,
    })
}

pub fn resolve_paths(context: &ResolutionContext, overrides: &PathOverrides) -> ResolvedPaths {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> ResolvedPaths
where
    F: Fn(&str) -> Option<String>,
{
    // Blank values (`LEETBOARD_CONFIG=` in a .env file) count as unset.
    let lookup_env = |key: &str| {
        lookup_env(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("LEETBOARD_PROJECT_ROOT") {
        (
            absolutize(Path::new(&value), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let (data_dir, data_source) = if let Some(path) = overrides.data_dir.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("LEETBOARD_DATA_DIR") {
        (
            absolutize(Path::new(&value), &project_root),
            ValueSource::Env,
        )
    } else {
        (project_root.clone(), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("LEETBOARD_CONFIG") {
        (
            absolutize(Path::new(&value), &project_root),
            ValueSource::Env,
        )
    } else {
        (data_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    ResolvedPaths {
        roster: RosterPaths::in_dir(&project_root),
        pins_path: data_dir.join(PINS_FILENAME),
        snapshot_path: data_dir.join(SNAPSHOT_FILENAME),
        project_root,
        data_dir,
        config_path,
        root_source,
        data_source,
        config_source,
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub created_roster_files: Vec<PathBuf>,
    pub wrote_config: bool,
}

/// Create the data dir, empty roster lists and a default config file.
/// Roster lists are never overwritten, even with `force`.
pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.project_root, &paths.data_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let mut created_roster_files = Vec::new();
    for path in paths.roster.all() {
        if write_text_file(path, "", false)? {
            created_roster_files.push(path.to_path_buf());
        }
    }

    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), options.force)?;

    Ok(InitReport {
        created_dirs,
        created_roster_files,
        wrote_config,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
