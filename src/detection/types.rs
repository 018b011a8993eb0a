use crate::error::DetectorError;
use crate::tracking::TrackId;
use serde::{Deserialize, Serialize};

/// Class label scheme shared with the external tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    /// Label 0, the person-equivalent
    Primary,
    /// Label 1, the hen-equivalent
    Secondary,
    Other(i64),
}

impl From<i64> for EntityClass {
    fn from(label: i64) -> Self {
        match label {
            0 => EntityClass::Primary,
            1 => EntityClass::Secondary,
            other => EntityClass::Other(other),
        }
    }
}

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer center, rounded toward negative infinity
    pub fn center(&self) -> (i32, i32) {
        (midpoint(self.x1, self.x2), midpoint(self.y1, self.y2))
    }
}

/// The floored mean of two i32s always fits back into an i32
fn midpoint(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedEntity {
    pub track_id: TrackId,
    pub class: EntityClass,
    pub bbox: BoundingBox,
}

/// Everything the tracker reported for one frame. Empty is a normal result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub frame_id: Option<u64>,
    pub entities: Vec<TrackedEntity>,
}

impl FrameDetections {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Parse one JSON line written by the tracker:
    /// `{"frame_id": 12, "detections": [{"id": 3, "cls": 0, "xyxy": [x1, y1, x2, y2]}]}`.
    /// Boxes without a track id are dropped.
    pub fn from_json_line(line: &str) -> Result<Self, DetectorError> {
        let raw: RawResult =
            serde_json::from_str(line).map_err(|e| DetectorError::Malformed {
                details: e.to_string(),
            })?;

        let entities = raw
            .detections
            .into_iter()
            .filter_map(|det| {
                let track_id = det.id?;
                let [x1, y1, x2, y2] = det.xyxy;
                Some(TrackedEntity {
                    track_id,
                    class: EntityClass::from(det.cls),
                    bbox: BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
                })
            })
            .collect();

        Ok(Self {
            frame_id: raw.frame_id,
            entities,
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct RawResult {
    #[serde(default)]
    frame_id: Option<u64>,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawDetection {
    #[serde(default)]
    id: Option<TrackId>,
    cls: i64,
    xyxy: [f64; 4],
}
