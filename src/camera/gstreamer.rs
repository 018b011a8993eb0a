use super::source::{SourceFactory, SourceProperties, VideoSource};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{Frame, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

const STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens V4L2 devices or URIs through a GStreamer pipeline ending in an appsink
pub struct GstSourceFactory;

impl GstSourceFactory {
    pub fn new() -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self)
    }

    /// Build the pipeline description for the configured source
    pub fn pipeline_string(config: &CameraConfig) -> String {
        let (width, height) = config.resolution;
        let source = config.source.trim();

        let head = if source.chars().all(|c| c.is_ascii_digit()) {
            format!("v4l2src device=/dev/video{} do-timestamp=true", source)
        } else if source.starts_with("/dev/") {
            format!("v4l2src device={} do-timestamp=true", source)
        } else if source.contains("://") {
            format!("uridecodebin uri={}", source)
        } else {
            source.to_string()
        };

        format!(
            "{} ! videoconvert ! videoscale ! videorate ! \
             video/x-raw,format=BGR,width={},height={},framerate={}/1 ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
            head, width, height, config.fps
        )
    }
}

#[async_trait]
impl SourceFactory for GstSourceFactory {
    async fn open(&self, config: &CameraConfig) -> Result<Box<dyn VideoSource>, CameraError> {
        let pipeline_desc = Self::pipeline_string(config);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let source_id = config.source.clone();
        let read_timeout = config.read_timeout();
        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::OpenFailed {
                source_id: source_id.clone(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink named 'sink'".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let source = tokio::task::spawn_blocking(move || {
            if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
                let _ = pipeline.set_state(gstreamer::State::Null);
                return Err(CameraError::OpenFailed {
                    source_id,
                    details: format!("Failed to start pipeline: {}", e),
                });
            }

            let timeout =
                gstreamer::ClockTime::from_mseconds(STATE_CHANGE_TIMEOUT.as_millis() as u64);
            let (result, current, _pending) = pipeline.state(timeout);
            let opened = result.is_ok() && current == gstreamer::State::Playing;

            Ok(GstVideoSource {
                pipeline,
                appsink,
                opened,
                read_timeout,
                frame_counter: 0,
            })
        })
        .await
        .map_err(|e| CameraError::OpenFailed {
            source_id: config.source.clone(),
            details: format!("Pipeline start task failed: {}", e),
        })??;

        match source.properties() {
            Some(props) => info!(
                "Camera opened. Actual properties: width={}, height={}, fps={:.1}",
                props.width, props.height, props.fps
            ),
            None => debug!("Camera opened, caps not negotiated yet"),
        }

        Ok(Box::new(source))
    }
}

pub struct GstVideoSource {
    pipeline: Pipeline,
    appsink: AppSink,
    opened: bool,
    read_timeout: Duration,
    frame_counter: u64,
}

impl GstVideoSource {
    fn negotiated_info(&self) -> Option<VideoInfo> {
        let caps = self.appsink.static_pad("sink")?.current_caps()?;
        VideoInfo::from_caps(&caps).ok()
    }
}

#[async_trait]
impl VideoSource for GstVideoSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    async fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        let appsink = self.appsink.clone();
        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let sample = tokio::task::spawn_blocking(move || appsink.try_pull_sample(timeout))
            .await
            .map_err(|e| CameraError::ReadFailed {
                details: format!("Sample pull task failed: {}", e),
            })?;

        let sample = match sample {
            Some(sample) => sample,
            None => {
                if self.appsink.is_eos() {
                    return Err(CameraError::ReadFailed {
                        details: "end of stream".to_string(),
                    });
                }
                return Ok(None);
            }
        };

        let buffer = sample.buffer().ok_or_else(|| CameraError::ReadFailed {
            details: "No buffer in sample".to_string(),
        })?;
        let caps = sample.caps().ok_or_else(|| CameraError::ReadFailed {
            details: "No caps in sample".to_string(),
        })?;
        let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::ReadFailed {
            details: format!("Failed to get video info: {}", e),
        })?;
        let map = buffer.map_readable().map_err(|e| CameraError::ReadFailed {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        trace!(
            "Captured frame {} ({}x{}, {} bytes)",
            frame_id,
            video_info.width(),
            video_info.height(),
            map.len()
        );

        Ok(Some(Frame::new(
            frame_id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            video_info.width(),
            video_info.height(),
            FrameFormat::Bgr24,
        )))
    }

    fn properties(&self) -> Option<SourceProperties> {
        self.negotiated_info().map(|info| {
            let fps = info.fps();
            let fps = if fps.denom() == 0 {
                0.0
            } else {
                fps.numer() as f64 / fps.denom() as f64
            };
            SourceProperties {
                width: info.width(),
                height: info.height(),
                fps,
            }
        })
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.opened = false;
        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| {
                warn!("Failed to stop GStreamer pipeline: {}", e);
                CameraError::Configuration {
                    details: format!("Failed to stop pipeline: {}", e),
                }
            })?;
        Ok(())
    }
}

impl Drop for GstVideoSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
