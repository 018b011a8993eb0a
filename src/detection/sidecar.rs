use super::types::FrameDetections;
use super::Detector;
use crate::error::DetectorError;
use crate::frame::Frame;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REOPEN_DELAY: Duration = Duration::from_secs(1);
const TAIL_POLL: Duration = Duration::from_millis(20);

type Slot = Option<Result<FrameDetections, DetectorError>>;

/// Consumes results from an external tracker process.
///
/// The tracker appends one JSON object per line to a file or FIFO. A reader
/// task keeps only the newest result; `detect` hands out each result at most
/// once and reports an empty frame when nothing new has arrived. While the
/// output cannot be opened or read, `detect` fails instead.
pub struct SidecarDetector {
    receiver: watch::Receiver<Slot>,
    source_error: watch::Receiver<Option<DetectorError>>,
    token: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl SidecarDetector {
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (sender, receiver) = watch::channel(None);
        let (source_sender, source_error) = watch::channel(None);
        let token = CancellationToken::new();

        info!("Reading detections from {}", path.display());
        let reader = tokio::spawn(read_results(path, sender, source_sender, token.clone()));

        Self {
            receiver,
            source_error,
            token,
            reader: Some(reader),
        }
    }
}

#[async_trait]
impl Detector for SidecarDetector {
    async fn detect(&mut self, frame: Option<&Frame>) -> Result<FrameDetections, DetectorError> {
        if frame.is_none() {
            return Err(DetectorError::MissingFrame);
        }

        let source_error = self.source_error.borrow().clone();
        if let Some(error) = source_error {
            return Err(error);
        }

        match self.receiver.has_changed() {
            Ok(true) => {}
            Ok(false) => return Ok(FrameDetections::empty()),
            Err(_) => {
                return Err(DetectorError::Unavailable {
                    details: "result reader stopped".to_string(),
                })
            }
        }

        let latest = self.receiver.borrow_and_update().clone();
        latest.unwrap_or_else(|| Ok(FrameDetections::empty()))
    }

    fn name(&self) -> &str {
        "sidecar"
    }

    async fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

impl Drop for SidecarDetector {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn read_results(
    path: PathBuf,
    sender: watch::Sender<Slot>,
    source: watch::Sender<Option<DetectorError>>,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                if source.borrow().is_none() {
                    warn!("Detections source {} unavailable: {}", path.display(), e);
                }
                source.send_replace(Some(DetectorError::Unavailable {
                    details: format!("{}: {}", path.display(), e),
                }));
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(REOPEN_DELAY) => continue,
                }
            }
        };

        if source.send_replace(None).is_some() {
            info!("Detections source {} available again", path.display());
        }

        let mut reader = BufReader::new(file);
        // Bytes of a line whose newline has not been written yet
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let read = tokio::select! {
                _ = token.cancelled() => return,
                read = reader.read_until(b'\n', &mut pending) => read,
            };

            match read {
                // Writer has not produced more yet; keep tailing
                Ok(0) => {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = sleep(TAIL_POLL) => {}
                    }
                }
                Ok(_) if pending.last() != Some(&b'\n') => continue,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&pending).trim().to_string();
                    pending.clear();
                    if line.is_empty() {
                        continue;
                    }
                    let result = FrameDetections::from_json_line(&line);
                    if let Err(e) = &result {
                        warn!("Discarding detection line: {}", e);
                    }
                    sender.send_replace(Some(result));
                }
                Err(e) => {
                    warn!("Detections source {} read error: {}", path.display(), e);
                    source.send_replace(Some(DetectorError::Unavailable {
                        details: e.to_string(),
                    }));
                    break;
                }
            }
        }
    }
    debug!("Detection reader stopped");
}
