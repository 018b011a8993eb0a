use super::*;
use crate::config::CameraConfig;
use crate::error::{CameraError, CoopguardError};
use crate::frame::{Frame, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy)]
enum ReadStep {
    Frame,
    Empty,
    Error,
}

enum OpenStep {
    Ok(Vec<ReadStep>),
    NotOpened,
    Fail,
}

#[derive(Clone, Default)]
struct ScriptedFactory {
    opens: Arc<Mutex<VecDeque<OpenStep>>>,
    open_count: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    fn push(&self, step: OpenStep) {
        self.opens.lock().push_back(step);
    }

    fn opens(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

struct ScriptedSource {
    reads: VecDeque<ReadStep>,
    opened: bool,
    counter: u64,
}

#[async_trait]
impl VideoSource for ScriptedSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    async fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        match self.reads.pop_front().unwrap_or(ReadStep::Empty) {
            ReadStep::Frame => {
                self.counter += 1;
                Ok(Some(Frame::new(
                    self.counter,
                    SystemTime::now(),
                    vec![0; 12],
                    2,
                    2,
                    FrameFormat::Bgr24,
                )))
            }
            ReadStep::Empty => Ok(None),
            ReadStep::Error => Err(CameraError::ReadFailed {
                details: "scripted failure".to_string(),
            }),
        }
    }

    fn properties(&self) -> Option<SourceProperties> {
        None
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.opened = false;
        // Release errors must never escape the supervisor
        Err(CameraError::Configuration {
            details: "release always complains".to_string(),
        })
    }
}

#[async_trait]
impl SourceFactory for ScriptedFactory {
    async fn open(&self, config: &CameraConfig) -> Result<Box<dyn VideoSource>, CameraError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let step = self.opens.lock().pop_front().unwrap_or(OpenStep::Fail);
        match step {
            OpenStep::Ok(reads) => Ok(Box::new(ScriptedSource {
                reads: reads.into(),
                opened: true,
                counter: 0,
            })),
            OpenStep::NotOpened => Ok(Box::new(ScriptedSource {
                reads: VecDeque::new(),
                opened: false,
                counter: 0,
            })),
            OpenStep::Fail => Err(CameraError::OpenFailed {
                source_id: config.source.clone(),
                details: "scripted open failure".to_string(),
            }),
        }
    }
}

fn create_test_camera_config(max_failures: u32, max_backoff_seconds: u64) -> CameraConfig {
    CameraConfig {
        source: "scripted".to_string(),
        resolution: (640, 480),
        fps: 15,
        max_failures,
        offline_alert_seconds: 30,
        max_backoff_seconds,
        read_timeout_ms: 100,
    }
}

#[tokio::test(start_paused = true)]
async fn test_construction_fails_when_source_cannot_open() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::Fail);

    let result = CameraSupervisor::new(create_test_camera_config(5, 60), Box::new(factory)).await;
    assert!(matches!(
        result,
        Err(CoopguardError::Camera(CameraError::OpenFailed { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_construction_fails_when_source_not_opened() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::NotOpened);

    let result = CameraSupervisor::new(create_test_camera_config(5, 60), Box::new(factory)).await;
    assert!(matches!(
        result,
        Err(CoopguardError::Camera(CameraError::NotOpened { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_successful_read_keeps_camera_healthy() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::Ok(vec![ReadStep::Frame, ReadStep::Empty, ReadStep::Frame]));

    let mut camera = CameraSupervisor::new(create_test_camera_config(5, 60), Box::new(factory))
        .await
        .unwrap();
    assert!(camera.is_alive());
    assert_eq!(camera.state().backoff, Duration::from_secs(1));

    assert!(camera.read().await.is_some());
    assert!(camera.read().await.is_none());
    assert_eq!(camera.state().consecutive_failures, 1);

    assert!(camera.read().await.is_some());
    assert_eq!(camera.state().consecutive_failures, 0);
    assert!(camera.is_alive());
}

#[tokio::test(start_paused = true)]
async fn test_max_failures_triggers_immediate_reinitialization() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::Ok(vec![ReadStep::Error; 3]));
    factory.push(OpenStep::Ok(vec![ReadStep::Frame]));

    let mut camera =
        CameraSupervisor::new(create_test_camera_config(3, 60), Box::new(factory.clone()))
            .await
            .unwrap();

    assert!(camera.read().await.is_none());
    assert!(camera.read().await.is_none());
    assert_eq!(factory.opens(), 1);

    // Third failure reaches the limit and reopens straight away
    assert!(camera.read().await.is_none());
    assert_eq!(factory.opens(), 2);
    assert!(camera.is_alive());
    assert_eq!(camera.state().consecutive_failures, 0);

    assert!(camera.read().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_per_failed_reinit_and_resets_on_recovery() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::Ok(vec![ReadStep::Error]));

    let mut camera =
        CameraSupervisor::new(create_test_camera_config(1, 8), Box::new(factory.clone()))
            .await
            .unwrap();

    // Failure limit reached, immediate reinit fails
    assert!(camera.read().await.is_none());
    assert!(!camera.is_alive());
    assert_eq!(camera.state().backoff, Duration::from_secs(1));

    for (n, expected) in [2u64, 4, 8, 8, 8].iter().enumerate() {
        let started = tokio::time::Instant::now();
        assert!(camera.read().await.is_none());
        assert!(!camera.is_alive(), "attempt {} should still be dead", n + 1);
        assert_eq!(camera.state().backoff, Duration::from_secs(*expected));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    factory.push(OpenStep::Ok(vec![ReadStep::Frame]));
    assert!(camera.read().await.is_none());
    assert!(camera.is_alive());
    assert_eq!(camera.state().backoff, Duration::from_secs(1));

    assert!(camera.read().await.is_some());
    assert_eq!(camera.state().backoff, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_offline_too_long_after_threshold() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::Ok(vec![ReadStep::Frame, ReadStep::Error]));

    let mut camera = CameraSupervisor::new(create_test_camera_config(1, 60), Box::new(factory))
        .await
        .unwrap();

    assert!(camera.read().await.is_some());
    assert!(!camera.offline_too_long());

    assert!(camera.read().await.is_none());
    assert!(!camera.is_alive());
    assert!(!camera.offline_too_long());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(camera.offline_too_long());
}

#[tokio::test(start_paused = true)]
async fn test_release_marks_camera_dead() {
    let factory = ScriptedFactory::default();
    factory.push(OpenStep::Ok(vec![]));

    let mut camera = CameraSupervisor::new(create_test_camera_config(5, 60), Box::new(factory))
        .await
        .unwrap();
    camera.release();
    assert!(!camera.is_alive());

    // Releasing twice is harmless
    camera.release();
}

#[tokio::test(start_paused = true)]
async fn test_mock_source_produces_frames() {
    let mut config = create_test_camera_config(5, 60);
    config.source = "mock".to_string();

    let factory = factory_for(&config).unwrap();
    let mut camera = CameraSupervisor::new(config, factory).await.unwrap();

    let frame = camera.read().await.expect("mock source should produce a frame");
    assert_eq!(frame.width, 640);
    assert_eq!(frame.height, 480);
    assert_eq!(frame.format, FrameFormat::Mjpeg);
    assert!(!frame.data.is_empty());
}
