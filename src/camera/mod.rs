#[cfg(all(feature = "camera", target_os = "linux"))]
mod gstreamer;
mod source;
mod supervisor;
#[cfg(test)]
mod tests;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gstreamer::{GstSourceFactory, GstVideoSource};
pub use source::{
    factory_for, MockSourceFactory, MockVideoSource, SourceFactory, SourceProperties, VideoSource,
};
pub use supervisor::{CameraState, CameraSupervisor};
