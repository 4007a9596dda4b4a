//! Station list loading.
//!
//! Stations come from a `[[station]]` TOML file when one exists, otherwise
//! from the built-in DeeFuzz Icecast list.  Ids are assigned by position.

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::platform;
use crate::protocol::{StationDescriptor, StationId};

/// Matches one `[[station]]` table.  Kept apart from `StationDescriptor` so
/// the file schema can evolve without touching the wire type.
#[derive(Debug, serde::Deserialize)]
struct TomlStationFile {
    #[serde(default)]
    station: Vec<TomlStation>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlStation {
    title: String,
    stream_url: String,
    metadata_url: String,
    #[serde(default)]
    frequency: String,
}

pub fn parse_stations_from_toml_str(content: &str) -> anyhow::Result<Vec<StationDescriptor>> {
    let file: TomlStationFile = toml::from_str(content)?;
    let stations = file
        .station
        .into_iter()
        .enumerate()
        .map(|(idx, s)| StationDescriptor {
            id: StationId(idx),
            title: s.title,
            frequency: s.frequency,
            stream_url: s.stream_url,
            metadata_url: s.metadata_url,
        })
        .collect();
    Ok(stations)
}

pub fn load_stations_from_toml(path: &Path) -> anyhow::Result<Vec<StationDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading station file {}", path.display()))?;
    parse_stations_from_toml_str(&content)
        .with_context(|| format!("parsing station file {}", path.display()))
}

/// Resolve the station list for startup.  A present-but-broken file is an
/// error; an absent or empty one falls back to the built-in list.
pub fn load_stations(path: &Path) -> anyhow::Result<Vec<StationDescriptor>> {
    let path = &platform::expand_home(path);
    if !path.exists() {
        info!("No station file at {:?}, using built-in stations", path);
        return Ok(builtin_stations());
    }

    let stations = load_stations_from_toml(path)?;
    if stations.is_empty() {
        warn!("Station file {:?} lists no stations, using built-in stations", path);
        return Ok(builtin_stations());
    }

    info!("Loaded {} stations from {:?}", stations.len(), path);
    Ok(stations)
}

const BUILTIN: &[(&str, &str)] = &[
    ("DeeFuzz Full", "deefuzz_full"),
    ("DeeFuzz House", "deefuzz_house"),
    ("DeeFuzz Techno", "deefuzz_techno"),
    ("DeeFuzz Jungle", "deefuzz_jungle"),
    ("DeeFuzz Down Tempo", "deefuzz_down_tempo"),
];

const BUILTIN_BASE: &str = "https://stream.parisson.com/icecast";

pub fn builtin_stations() -> Vec<StationDescriptor> {
    BUILTIN
        .iter()
        .enumerate()
        .map(|(idx, (title, mount))| StationDescriptor {
            id: StationId(idx),
            title: title.to_string(),
            frequency: String::new(),
            stream_url: format!("{}/{}.mp3", BUILTIN_BASE, mount),
            metadata_url: format!("{}/{}.mp3.xspf", BUILTIN_BASE, mount),
        })
        .collect()
}
