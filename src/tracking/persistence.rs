use super::store::{TrackId, TrackSample, MAX_HISTORY};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// On-disk shape: `{"<id>": [[timestamp, x, y], ...]}`
type PersistedTracks = BTreeMap<TrackId, Vec<TrackSample>>;

/// Write the newest samples of every track as JSON.
///
/// The file is written next to the target and renamed into place so a crash
/// mid-write never leaves a truncated state file behind.
pub fn save_tracks(path: &Path, tracks: &HashMap<TrackId, VecDeque<TrackSample>>) -> Result<()> {
    let persisted: PersistedTracks = tracks
        .iter()
        .map(|(id, history)| {
            let skip = history.len().saturating_sub(MAX_HISTORY);
            (*id, history.iter().skip(skip).copied().collect())
        })
        .collect();

    let json = serde_json::to_vec(&persisted)?;

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;

    debug!("Saved {} tracks to {}", persisted.len(), path.display());
    Ok(())
}

/// Sibling file the state is staged in; never the target itself
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read persisted tracks. A missing or malformed file yields an empty map.
pub fn load_tracks(path: &Path) -> HashMap<TrackId, VecDeque<TrackSample>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("No persisted tracks at {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    let persisted: PersistedTracks = match serde_json::from_slice(&contents) {
        Ok(persisted) => persisted,
        Err(e) => {
            warn!("Ignoring malformed track file {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    persisted
        .into_iter()
        .filter(|(_, samples)| !samples.is_empty())
        .map(|(id, samples)| {
            let skip = samples.len().saturating_sub(MAX_HISTORY);
            (id, samples.into_iter().skip(skip).collect())
        })
        .collect()
}
