//! Command handlers for fleetctl.

use anyhow::{bail, Context, Result};
use fleet_shared::{CanonicalDevice, NormalizeConfig, Normalizer, CONFIG_FILE};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::output;

/// One device file's outcome in a fleet run.
#[derive(Debug)]
pub struct FleetEntry {
    pub path: PathBuf,
    /// Read, parse and normalization failures alike
    pub result: Result<CanonicalDevice>,
}

/// Explicit config paths must exist; the default `fleet.toml` is optional.
pub fn load_config(path: Option<&Path>) -> Result<NormalizeConfig> {
    match path {
        Some(path) => {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
            NormalizeConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
        None => NormalizeConfig::load(Path::new(CONFIG_FILE))
            .with_context(|| format!("failed to load {}", CONFIG_FILE)),
    }
}

pub fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Normalize one device file, with an optional separate events file.
pub fn normalize_file(
    normalizer: &Normalizer,
    device: &Path,
    events: Option<&Path>,
) -> Result<CanonicalDevice> {
    let raw = read_json(device)?;
    let events = events.map(read_json).transpose()?;
    normalizer
        .normalize(&raw, events.as_ref())
        .with_context(|| format!("cannot normalize {}", device.display()))
}

/// Handle `fleetctl normalize`
pub async fn handle_normalize(
    file: PathBuf,
    events: Option<PathBuf>,
    config: Option<PathBuf>,
    compact: bool,
) -> Result<()> {
    let normalizer = Normalizer::new(load_config(config.as_deref())?);
    let device = normalize_file(&normalizer, &file, events.as_deref())?;
    let json = if compact {
        serde_json::to_string(&device)?
    } else {
        serde_json::to_string_pretty(&device)?
    };
    println!("{}", json);
    Ok(())
}

/// `*.json` files in a directory, sorted by name.
pub fn device_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Normalize every device file in `dir` on the blocking pool.
///
/// Unreadable files become failed entries; they never abort the run.
pub async fn collect_fleet(normalizer: &Normalizer, dir: &Path) -> Result<Vec<FleetEntry>> {
    let files = device_files(dir)?;
    debug!(count = files.len(), dir = %dir.display(), "normalizing fleet");

    let mut join_set = JoinSet::new();
    for path in files {
        let normalizer = normalizer.clone();
        join_set.spawn_blocking(move || {
            let result = read_json(&path).and_then(|raw| {
                normalizer.normalize(&raw, None).map_err(anyhow::Error::from)
            });
            (path, result)
        });
    }

    let mut entries = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let (path, result) = joined.context("normalization task panicked")?;
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "device file failed");
        }
        entries.push(FleetEntry { path, result });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Handle `fleetctl fleet`
pub async fn handle_fleet(dir: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let normalizer = Normalizer::new(load_config(config.as_deref())?);
    let entries = collect_fleet(&normalizer, &dir).await?;
    if entries.is_empty() {
        println!("No device files in {}", dir.display());
        return Ok(());
    }
    print!("{}", output::fleet_table(&entries, true));
    Ok(())
}
