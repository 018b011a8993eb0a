use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG - compressed, variable size
    Mjpeg,
    /// Packed 8-bit BGR, as produced by most capture pipelines
    Bgr24,
}

/// One frame handed from the camera to the detector
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic frame counter assigned by the source
    pub id: u64,
    pub timestamp: SystemTime,
    /// Shared so the latest-frame slot and the detector can hold it without copying
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl Frame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }
}
