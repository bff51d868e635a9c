//! Device camera lifecycle: acquire a front-facing stream, watch for
//! readiness, release on every exit path.
//!
//! Hosts plug their media API in through [`CameraDevice`] / [`VideoStream`].
//! The controller hands back a [`CameraSession`], an RAII handle: dropping it
//! stops every track, so a session can never outlive the step that owns it.
//!
//! A leaked stream keeps the camera hardware locked (and the indicator LED
//! on), so `release()` is idempotent and also runs from `Drop`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera access denied. Please allow camera permissions and try again.")]
    PermissionDenied,

    #[error("No camera found. Please ensure your device has a camera.")]
    DeviceNotFound,

    #[error("Unable to access camera: {0}")]
    DeviceUnavailable(String),
}

impl CameraError {
    /// Classify a browser `getUserMedia` failure by its DOMException name.
    pub fn from_media_error(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" => Self::PermissionDenied,
            "NotFoundError" => Self::DeviceNotFound,
            _ => Self::DeviceUnavailable(if message.is_empty() {
                name.to_string()
            } else {
                format!("{name}: {message}")
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    User,
    Environment,
}

/// Requested stream shape. Devices may pick any resolution at or above the
/// minimum; they should aim for the ideal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub audio: bool,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            ideal_width: 1280,
            ideal_height: 720,
            min_width: 640,
            min_height: 480,
            audio: false,
        }
    }
}

impl CameraConstraints {
    pub fn admits(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

/// Resolution reported by the stream once its first frame has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
}

// ═══════════════════════════════════════════════════════════
// Device traits
// ═══════════════════════════════════════════════════════════

/// A live video stream from the host's media API.
pub trait VideoStream: Send {
    /// `None` until the first frame's metadata is known.
    fn metadata(&self) -> Option<FrameMetadata>;

    /// Current frame as the sensor delivers it (not mirrored).
    fn grab_frame(&mut self) -> Option<RgbImage>;

    /// Stop every track. Called at most once per stream.
    fn stop(&mut self);
}

/// The host's camera. `open` may suspend on a permission prompt.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoStream>, CameraError>;
}

// ═══════════════════════════════════════════════════════════
// CameraSession: RAII stream handle
// ═══════════════════════════════════════════════════════════

pub struct CameraSession {
    id: Uuid,
    stream: Option<Box<dyn VideoStream>>,
    opened_at: DateTime<Utc>,
}

impl CameraSession {
    fn new(stream: Box<dyn VideoStream>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: Some(stream),
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    /// True once the stream has reported first-frame metadata.
    pub fn is_ready(&self) -> bool {
        self.metadata().is_some()
    }

    pub fn metadata(&self) -> Option<FrameMetadata> {
        self.stream.as_ref().and_then(|s| s.metadata())
    }

    pub fn grab_frame(&mut self) -> Option<RgbImage> {
        self.stream.as_mut().and_then(|s| s.grab_frame())
    }

    /// Stop all tracks. No-op on an already released session.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!(session = %self.id, "Camera session released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .field("ready", &self.is_ready())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// DeviceCameraController
// ═══════════════════════════════════════════════════════════

pub struct DeviceCameraController<D> {
    device: D,
}

impl<D: CameraDevice> DeviceCameraController<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub async fn acquire(&self, constraints: &CameraConstraints) -> Result<CameraSession, CameraError> {
        match self.device.open(constraints).await {
            Ok(stream) => {
                let session = CameraSession::new(stream);
                tracing::info!(session = %session.id, "Camera stream acquired");
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Camera acquisition failed");
                Err(e)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// MockCamera
// ═══════════════════════════════════════════════════════════

/// In-memory camera that streams a fixed frame.
///
/// Clones share counters and switches, so a test can keep one clone while the
/// workflow owns another.
#[derive(Clone)]
pub struct MockCamera {
    frame: RgbImage,
    ready: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<CameraError>>>,
    gate: Option<Arc<Notify>>,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl MockCamera {
    pub fn new(frame: RgbImage) -> Self {
        Self {
            frame,
            ready: Arc::new(AtomicBool::new(true)),
            failure: Arc::new(Mutex::new(None)),
            gate: None,
            live: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 640x480 frame, left half red and right half blue.
    pub fn split_frame() -> Self {
        let frame = RgbImage::from_fn(640, 480, |x, _| {
            if x < 320 {
                Rgb([220, 30, 30])
            } else {
                Rgb([30, 30, 220])
            }
        });
        Self::new(frame)
    }

    /// `open` waits for one `notify_one()` on the gate before answering.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_failure(&self, failure: Option<CameraError>) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = failure;
        }
    }

    /// Streams report metadata only while this is set.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for MockCamera {
    async fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(err) = failure {
            return Err(err);
        }
        if !constraints.admits(self.frame.width(), self.frame.height()) {
            return Err(CameraError::DeviceUnavailable(format!(
                "{}x{} below minimum {}x{}",
                self.frame.width(),
                self.frame.height(),
                constraints.min_width,
                constraints.min_height
            )));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStream {
            frame: self.frame.clone(),
            ready: self.ready.clone(),
            live: self.live.clone(),
            stopped: false,
        }))
    }
}

struct MockStream {
    frame: RgbImage,
    ready: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    stopped: bool,
}

impl VideoStream for MockStream {
    fn metadata(&self) -> Option<FrameMetadata> {
        (!self.stopped && self.ready.load(Ordering::SeqCst)).then(|| FrameMetadata {
            width: self.frame.width(),
            height: self.frame.height(),
        })
    }

    fn grab_frame(&mut self) -> Option<RgbImage> {
        (!self.stopped).then(|| self.frame.clone())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_constraints_match_capture_profile() {
        let c = CameraConstraints::default();
        assert_eq!(c.facing, FacingMode::User);
        assert_eq!((c.ideal_width, c.ideal_height), (1280, 720));
        assert_eq!((c.min_width, c.min_height), (640, 480));
        assert!(!c.audio);
        assert!(c.admits(640, 480));
        assert!(!c.admits(639, 480));
        assert!(!c.admits(640, 479));
    }

    #[test]
    fn media_error_names_are_classified() {
        assert_eq!(
            CameraError::from_media_error("NotAllowedError", "Permission denied"),
            CameraError::PermissionDenied
        );
        assert_eq!(
            CameraError::from_media_error("NotFoundError", ""),
            CameraError::DeviceNotFound
        );
        assert_eq!(
            CameraError::from_media_error("NotReadableError", "in use"),
            CameraError::DeviceUnavailable("NotReadableError: in use".into())
        );
        assert_eq!(
            CameraError::from_media_error("OverconstrainedError", ""),
            CameraError::DeviceUnavailable("OverconstrainedError".into())
        );
    }

    #[tokio::test]
    async fn acquire_returns_live_session() {
        let camera = MockCamera::split_frame();
        let controller = DeviceCameraController::new(camera.clone());

        let session = controller.acquire(&CameraConstraints::default()).await.unwrap();
        assert!(session.is_live());
        assert!(session.is_ready());
        assert_eq!(
            session.metadata(),
            Some(FrameMetadata {
                width: 640,
                height: 480
            })
        );
        assert_eq!(camera.live_sessions(), 1);
    }

    #[tokio::test]
    async fn not_ready_until_metadata_arrives() {
        let camera = MockCamera::split_frame();
        camera.set_ready(false);
        let controller = DeviceCameraController::new(camera.clone());

        let session = controller.acquire(&CameraConstraints::default()).await.unwrap();
        assert!(session.is_live());
        assert!(!session.is_ready());

        camera.set_ready(true);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let camera = MockCamera::split_frame();
        let controller = DeviceCameraController::new(camera.clone());
        let mut session = controller.acquire(&CameraConstraints::default()).await.unwrap();

        session.release();
        assert!(!session.is_live());
        assert!(!session.is_ready());
        assert!(session.grab_frame().is_none());
        assert_eq!(camera.live_sessions(), 0);

        session.release();
        assert_eq!(camera.live_sessions(), 0);
    }

    #[tokio::test]
    async fn dropping_session_releases_stream() {
        let camera = MockCamera::split_frame();
        let controller = DeviceCameraController::new(camera.clone());
        {
            let _session = controller.acquire(&CameraConstraints::default()).await.unwrap();
            assert_eq!(camera.live_sessions(), 1);
        }
        assert_eq!(camera.live_sessions(), 0);
        assert_eq!(camera.open_count(), 1);
    }

    #[tokio::test]
    async fn device_failure_is_propagated() {
        let camera = MockCamera::split_frame();
        camera.set_failure(Some(CameraError::PermissionDenied));
        let controller = DeviceCameraController::new(camera.clone());

        let err = controller.acquire(&CameraConstraints::default()).await.unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);
        assert_eq!(camera.live_sessions(), 0);
    }

    #[tokio::test]
    async fn undersized_sensor_is_unavailable() {
        let camera = MockCamera::new(RgbImage::new(320, 240));
        let controller = DeviceCameraController::new(camera);

        let err = controller.acquire(&CameraConstraints::default()).await.unwrap_err();
        assert!(matches!(err, CameraError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn gated_open_waits_for_release_signal() {
        let gate = Arc::new(Notify::new());
        let camera = MockCamera::split_frame().with_gate(gate.clone());
        let controller = DeviceCameraController::new(camera.clone());

        gate.notify_one();
        let session = controller.acquire(&CameraConstraints::default()).await.unwrap();
        assert!(session.is_live());
    }
}
