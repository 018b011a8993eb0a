mod persistence;
mod store;
#[cfg(test)]
mod tests;

pub use persistence::{load_tracks, save_tracks};
pub use store::{AnomalyMatch, AnomalyRule, TrackId, TrackSample, TrackStore, MAX_HISTORY};
