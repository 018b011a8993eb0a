use super::persistence;
use crate::config::{TrackingConfig, ZoneConfig};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Identifier assigned by the external tracker
pub type TrackId = i64;

/// Retained samples per track
pub const MAX_HISTORY: usize = 5;

/// Elapsed-time floor for velocity, in seconds
const MIN_ELAPSED: f64 = 1e-3;

/// One observed position. Serialized as `[timestamp, x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, i32, i32)", into = "(f64, i32, i32)")]
pub struct TrackSample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub x: i32,
    pub y: i32,
}

impl From<(f64, i32, i32)> for TrackSample {
    fn from((timestamp, x, y): (f64, i32, i32)) -> Self {
        Self { timestamp, x, y }
    }
}

impl From<TrackSample> for (f64, i32, i32) {
    fn from(sample: TrackSample) -> Self {
        (sample.timestamp, sample.x, sample.y)
    }
}

/// Thresholds for the velocity + proximity rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyRule {
    pub pixel_threshold: f64,
    pub velocity_threshold: f64,
    pub theft_count_threshold: usize,
}

impl From<&ZoneConfig> for AnomalyRule {
    fn from(zones: &ZoneConfig) -> Self {
        Self {
            pixel_threshold: zones.pixel_threshold,
            velocity_threshold: zones.velocity_threshold,
            theft_count_threshold: zones.theft_count_threshold,
        }
    }
}

/// The primary entity that tripped the rule
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyMatch {
    pub track_id: TrackId,
    /// Pixels per second between the oldest and newest retained samples
    pub velocity: f64,
    pub nearby: usize,
}

/// Bounded position histories keyed by track id
pub struct TrackStore {
    tracks: HashMap<TrackId, VecDeque<TrackSample>>,
    rule: AnomalyRule,
    stale_timeout: f64,
    save_interval: f64,
    persist_path: Option<PathBuf>,
    last_save: f64,
}

impl TrackStore {
    pub fn new(rule: AnomalyRule, tracking: &TrackingConfig) -> Self {
        let persist_path = tracking.persist_path.as_ref().map(PathBuf::from);

        let tracks = match &persist_path {
            Some(path) => {
                let tracks = persistence::load_tracks(path);
                if !tracks.is_empty() {
                    info!("Restored {} tracks from {}", tracks.len(), path.display());
                }
                tracks
            }
            None => HashMap::new(),
        };

        Self {
            tracks,
            rule,
            stale_timeout: tracking.stale_timeout_seconds,
            save_interval: tracking.save_interval_seconds,
            persist_path,
            last_save: now_seconds(),
        }
    }

    pub fn from_config(zones: &ZoneConfig, tracking: &TrackingConfig) -> Self {
        Self::new(AnomalyRule::from(zones), tracking)
    }

    /// Record a position for `id` at the current time
    pub fn update(&mut self, id: TrackId, x: i32, y: i32) {
        self.update_at(id, x, y, now_seconds());
    }

    /// Record a position observed at `now` (seconds since the Unix epoch)
    pub fn update_at(&mut self, id: TrackId, x: i32, y: i32, now: f64) {
        let history = self.tracks.entry(id).or_default();
        history.push_back(TrackSample { timestamp: now, x, y });
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }

        self.cleanup_stale(now);

        if self.persist_path.is_some() && now - self.last_save > self.save_interval {
            self.save();
            self.last_save = now;
        }
    }

    /// True if any primary entity is moving fast near enough secondary entities
    pub fn evaluate(&self, primaries: &[(TrackId, (i32, i32))], secondaries: &[(i32, i32)]) -> bool {
        self.find_anomaly(primaries, secondaries).is_some()
    }

    /// Like `evaluate`, but reports which track matched
    pub fn find_anomaly(
        &self,
        primaries: &[(TrackId, (i32, i32))],
        secondaries: &[(i32, i32)],
    ) -> Option<AnomalyMatch> {
        for &(track_id, (px, py)) in primaries {
            let history = match self.tracks.get(&track_id) {
                Some(history) if history.len() >= 2 => history,
                _ => continue,
            };

            let (first, last) = match (history.front(), history.back()) {
                (Some(first), Some(last)) => (first, last),
                _ => continue,
            };

            let elapsed = (last.timestamp - first.timestamp).max(MIN_ELAPSED);
            let velocity = distance((first.x, first.y), (last.x, last.y)) / elapsed;

            let nearby = secondaries
                .iter()
                .filter(|&&pos| distance((px, py), pos) < self.rule.pixel_threshold)
                .count();

            if velocity > self.rule.velocity_threshold && nearby >= self.rule.theft_count_threshold
            {
                debug!(
                    "Track {} matched: velocity {:.1}px/s, {} nearby",
                    track_id, velocity, nearby
                );
                return Some(AnomalyMatch {
                    track_id,
                    velocity,
                    nearby,
                });
            }
        }

        None
    }

    /// Best-effort write of the whole store; failures are logged and swallowed
    pub fn save(&self) {
        if let Some(path) = &self.persist_path {
            if let Err(e) = persistence::save_tracks(path, &self.tracks) {
                warn!("Failed to persist tracks to {}: {}", path.display(), e);
            }
        }
    }

    /// Replace in-memory state with the persisted file, if any
    pub fn load(&mut self) {
        if let Some(path) = &self.persist_path {
            self.tracks = persistence::load_tracks(path);
        }
    }

    pub fn history(&self, id: TrackId) -> Option<&VecDeque<TrackSample>> {
        self.tracks.get(&id)
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn cleanup_stale(&mut self, now: f64) {
        let stale_timeout = self.stale_timeout;
        let before = self.tracks.len();
        self.tracks.retain(|_, history| match history.back() {
            Some(newest) => now - newest.timestamp <= stale_timeout,
            None => false,
        });

        let removed = before - self.tracks.len();
        if removed > 0 {
            debug!("Evicted {} stale tracks", removed);
        }
    }
}

fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = f64::from(a.0) - f64::from(b.0);
    let dy = f64::from(a.1) - f64::from(b.1);
    dx.hypot(dy)
}

pub(crate) fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
