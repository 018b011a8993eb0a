use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{Frame, FrameFormat};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};

/// Properties the source actually negotiated, which may differ from the request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An open video source handle
#[async_trait]
pub trait VideoSource: Send {
    /// Whether the underlying device or pipeline reports itself open
    fn is_opened(&self) -> bool;

    /// Read one frame. `Ok(None)` means the source produced nothing in time.
    async fn read(&mut self) -> Result<Option<Frame>, CameraError>;

    fn properties(&self) -> Option<SourceProperties>;

    /// Release the handle. Calling this more than once is harmless.
    fn release(&mut self) -> Result<(), CameraError>;
}

/// Opens (and reopens) video sources for the supervisor
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, config: &CameraConfig) -> Result<Box<dyn VideoSource>, CameraError>;

    /// Short label for logs
    fn describe(&self, config: &CameraConfig) -> String {
        config.source.clone()
    }
}

/// Picks the backend for the configured source
pub fn factory_for(config: &CameraConfig) -> Result<Box<dyn SourceFactory>, CameraError> {
    if config.source.eq_ignore_ascii_case("mock") {
        info!("Using synthetic camera source");
        return Ok(Box::new(MockSourceFactory));
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    {
        Ok(Box::new(super::gstreamer::GstSourceFactory::new()?))
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    {
        tracing::warn!(
            "GStreamer camera backend unavailable, cannot open source {}",
            config.source
        );
        Err(CameraError::NotAvailable)
    }
}

/// Synthetic source for hardware-less runs
pub struct MockSourceFactory;

#[async_trait]
impl SourceFactory for MockSourceFactory {
    async fn open(&self, config: &CameraConfig) -> Result<Box<dyn VideoSource>, CameraError> {
        debug!("Opening mock camera source");
        Ok(Box::new(MockVideoSource::new(config)))
    }

    fn describe(&self, _config: &CameraConfig) -> String {
        "mock".to_string()
    }
}

/// Generates small MJPEG-shaped frames at the configured rate
pub struct MockVideoSource {
    width: u32,
    height: u32,
    fps: u32,
    frame_counter: u64,
    opened: bool,
}

impl MockVideoSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.resolution.0,
            height: config.resolution.1,
            fps: config.fps.max(1),
            frame_counter: 0,
            opened: true,
        }
    }
}

#[async_trait]
impl VideoSource for MockVideoSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    async fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.opened {
            return Err(CameraError::ReadFailed {
                details: "mock source released".to_string(),
            });
        }

        tokio::time::sleep(Duration::from_millis(1000 / self.fps as u64)).await;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01,
        ];
        let pattern_size = 256 + (frame_id % 128) as usize;
        data.extend(vec![(frame_id % 256) as u8; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        trace!("Generated mock frame {} ({} bytes)", frame_id, data.len());

        Ok(Some(Frame::new(
            frame_id,
            SystemTime::now(),
            data,
            self.width,
            self.height,
            FrameFormat::Mjpeg,
        )))
    }

    fn properties(&self) -> Option<SourceProperties> {
        Some(SourceProperties {
            width: self.width,
            height: self.height,
            fps: self.fps as f64,
        })
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.opened = false;
        Ok(())
    }
}
