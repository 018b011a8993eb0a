//! Boundary to the external object detector/tracker.
//!
//! The model itself runs outside this process; this module defines the typed
//! per-frame result, a reader for the tracker's output, and failure
//! accounting around it.

pub mod monitor;
pub mod sidecar;
pub mod types;


pub use monitor::{DetectorMonitor, FailureCallback};
pub use sidecar::SidecarDetector;
pub use types::{BoundingBox, EntityClass, FrameDetections, TrackedEntity};

use crate::error::DetectorError;
use crate::frame::Frame;
use crate::tracking::{TrackId, TrackStore};
use async_trait::async_trait;

/// Produces tracked entities for a frame
#[async_trait]
pub trait Detector: Send {
    async fn detect(&mut self, frame: Option<&Frame>) -> Result<FrameDetections, DetectorError>;

    fn name(&self) -> &str;

    /// Stop any background work
    async fn shutdown(&mut self) {}
}

/// Primary entities with their track ids, and secondary entity positions
pub type SplitDetections = (Vec<(TrackId, (i32, i32))>, Vec<(i32, i32)>);

/// Feed every entity's center into the track store and sort entities by class
pub fn split_detections(store: &mut TrackStore, detections: &FrameDetections) -> SplitDetections {
    let mut primaries = Vec::new();
    let mut secondaries = Vec::new();

    for entity in &detections.entities {
        let (cx, cy) = entity.bbox.center();
        store.update(entity.track_id, cx, cy);

        match entity.class {
            EntityClass::Primary => primaries.push((entity.track_id, (cx, cy))),
            EntityClass::Secondary => secondaries.push((cx, cy)),
            EntityClass::Other(_) => {}
        }
    }

    (primaries, secondaries)
}
