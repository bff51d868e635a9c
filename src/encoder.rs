//! Frame capture and still encoding.
//!
//! The preview the user sees is mirrored, so every captured frame is flipped
//! about the vertical axis before anything is encoded. The submitted selfie
//! must match what was on screen, not what the sensor delivered.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use thiserror::Error;

use crate::camera::CameraSession;
use crate::config::{CAPTURE_JPEG_QUALITY, SELFIE_FILENAME};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Could not encode photo: {0}")]
    EncodingFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A mirrored frame plus its JPEG preview.
#[derive(Debug, Clone)]
pub struct StillImage {
    pixels: RgbImage,
    preview: Vec<u8>,
    captured_at: DateTime<Utc>,
}

impl StillImage {
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// JPEG bytes at capture quality, for display before confirming.
    pub fn preview_jpeg(&self) -> &[u8] {
        &self.preview
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

/// The selfie as submitted: JPEG bytes under a fixed filename.
#[derive(Debug, Clone)]
pub struct PhotoArtifact {
    bytes: Arc<[u8]>,
    captured_at: DateTime<Utc>,
}

impl PhotoArtifact {
    pub fn from_jpeg(bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            bytes: bytes.into(),
            captured_at,
        }
    }

    pub fn filename(&self) -> &'static str {
        SELFIE_FILENAME
    }

    pub fn media_type(&self) -> &'static str {
        ImageFormat::Jpeg.media_type()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[derive(Debug, Clone)]
pub struct CaptureEncoder {
    preview_quality: f32,
}

impl Default for CaptureEncoder {
    fn default() -> Self {
        Self::new(CAPTURE_JPEG_QUALITY)
    }
}

impl CaptureEncoder {
    pub fn new(preview_quality: f32) -> Self {
        Self { preview_quality }
    }

    /// Grab the current sensor frame, unmirrored.
    ///
    /// Returns `None` when the session is not ready: capturing before the
    /// first frame is a caller error and does nothing.
    pub fn sample(&self, session: &mut CameraSession) -> Option<RgbImage> {
        if !session.is_ready() {
            tracing::debug!(session = %session.id(), "Capture ignored, camera not ready");
            return None;
        }
        session.grab_frame()
    }

    /// Mirror a sampled frame and encode its preview on the blocking pool.
    pub async fn still_from_frame(&self, frame: RgbImage) -> Result<StillImage, EncodeError> {
        let captured_at = Utc::now();
        let quality = self.preview_quality;
        let (pixels, preview) = tokio::task::spawn_blocking(move || {
            let pixels = mirror_horizontally(&frame);
            let preview = encode(&pixels, ImageFormat::Jpeg, quality)?;
            Ok::<_, EncodeError>((pixels, preview))
        })
        .await
        .map_err(|e| EncodeError::EncodingFailed(format!("encoder task failed: {e}")))??;

        tracing::debug!(
            size = format!("{}x{}", pixels.width(), pixels.height()),
            preview_bytes = preview.len(),
            "Frame captured"
        );
        Ok(StillImage {
            pixels,
            preview,
            captured_at,
        })
    }

    /// [`sample`](Self::sample) then [`still_from_frame`](Self::still_from_frame).
    pub async fn capture_frame(&self, session: &mut CameraSession) -> Result<Option<StillImage>, EncodeError> {
        match self.sample(session) {
            Some(frame) => self.still_from_frame(frame).await.map(Some),
            None => Ok(None),
        }
    }

    /// Re-encode a still on the blocking pool.
    pub async fn to_blob(&self, still: StillImage, format: ImageFormat, quality: f32) -> Result<EncodedBlob, EncodeError> {
        let bytes = tokio::task::spawn_blocking(move || encode(&still.pixels, format, quality))
            .await
            .map_err(|e| EncodeError::EncodingFailed(format!("encoder task failed: {e}")))??;
        Ok(EncodedBlob {
            bytes,
            media_type: format.media_type(),
        })
    }
}

/// Flip about the vertical axis: pixel (x, y) moves to (w - 1 - x, y).
pub fn mirror_horizontally(frame: &RgbImage) -> RgbImage {
    image::imageops::flip_horizontal(frame)
}

/// Map a 0.0–1.0 quality to the encoder's 1–100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
}

fn encode(pixels: &RgbImage, format: ImageFormat, quality: f32) -> Result<Vec<u8>, EncodeError> {
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(EncodeError::EncodingFailed("frame is empty".into()));
    }
    let output = match format {
        ImageFormat::Jpeg => ImageOutputFormat::Jpeg(jpeg_quality(quality)),
        ImageFormat::Png => ImageOutputFormat::Png,
    };
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(pixels.clone())
        .write_to(&mut cursor, output)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConstraints, DeviceCameraController, MockCamera};
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([220, 30, 30]);
    const BLUE: Rgb<u8> = Rgb([30, 30, 220]);

    async fn live_session(camera: &MockCamera) -> CameraSession {
        DeviceCameraController::new(camera.clone())
            .acquire(&CameraConstraints::default())
            .await
            .unwrap()
    }

    fn still_of(pixels: RgbImage) -> StillImage {
        StillImage {
            pixels,
            preview: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn mirror_swaps_left_and_right() {
        let mut frame = RgbImage::new(3, 1);
        frame.put_pixel(0, 0, RED);
        frame.put_pixel(1, 0, Rgb([0, 255, 0]));
        frame.put_pixel(2, 0, BLUE);

        let mirrored = mirror_horizontally(&frame);
        assert_eq!(*mirrored.get_pixel(0, 0), BLUE);
        assert_eq!(*mirrored.get_pixel(1, 0), Rgb([0, 255, 0]));
        assert_eq!(*mirrored.get_pixel(2, 0), RED);
    }

    #[test]
    fn mirror_keeps_rows() {
        let frame = RgbImage::from_fn(2, 2, |x, y| Rgb([x as u8, y as u8, 0]));
        let mirrored = mirror_horizontally(&frame);
        assert_eq!(*mirrored.get_pixel(0, 1), Rgb([1, 1, 0]));
        assert_eq!(*mirrored.get_pixel(1, 1), Rgb([0, 1, 0]));
    }

    #[test]
    fn quality_maps_to_percent() {
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(7.0), 100);
    }

    #[tokio::test]
    async fn capture_mirrors_the_sensor_frame() {
        let camera = MockCamera::split_frame();
        let mut session = live_session(&camera).await;

        let still = CaptureEncoder::default()
            .capture_frame(&mut session)
            .await
            .unwrap()
            .expect("ready session captures");

        assert_eq!(still.dimensions(), (640, 480));
        // Sensor frame is red on the left; the user saw red on the right.
        assert_eq!(*still.pixels().get_pixel(0, 0), BLUE);
        assert_eq!(*still.pixels().get_pixel(639, 479), RED);
        assert_eq!(&still.preview_jpeg()[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn capture_before_ready_is_noop() {
        let camera = MockCamera::split_frame();
        camera.set_ready(false);
        let mut session = live_session(&camera).await;

        let still = CaptureEncoder::default().capture_frame(&mut session).await.unwrap();
        assert!(still.is_none());
        assert!(session.is_live());
    }

    #[tokio::test]
    async fn capture_after_release_is_noop() {
        let camera = MockCamera::split_frame();
        let mut session = live_session(&camera).await;
        session.release();

        let encoder = CaptureEncoder::default();
        assert!(encoder.sample(&mut session).is_none());
        assert!(encoder.capture_frame(&mut session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_frame_preview_fails() {
        let err = CaptureEncoder::default()
            .still_from_frame(RgbImage::new(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::EncodingFailed(_)));
    }

    #[tokio::test]
    async fn to_blob_jpeg_decodes_to_same_size() {
        let still = still_of(RgbImage::from_pixel(64, 48, RED));
        let blob = CaptureEncoder::default()
            .to_blob(still, ImageFormat::Jpeg, 0.8)
            .await
            .unwrap();

        assert_eq!(blob.media_type, "image/jpeg");
        let decoded = image::load_from_memory(&blob.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn to_blob_png_is_lossless() {
        let still = still_of(RgbImage::from_pixel(8, 8, BLUE));
        let blob = CaptureEncoder::default()
            .to_blob(still, ImageFormat::Png, 0.8)
            .await
            .unwrap();

        assert_eq!(blob.media_type, "image/png");
        let decoded = image::load_from_memory(&blob.bytes).unwrap().to_rgb8();
        assert_eq!(*decoded.get_pixel(3, 3), BLUE);
    }

    #[tokio::test]
    async fn to_blob_empty_frame_fails() {
        let still = still_of(RgbImage::new(0, 0));
        let err = CaptureEncoder::default()
            .to_blob(still, ImageFormat::Jpeg, 0.8)
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::EncodingFailed(_)));
    }

    #[test]
    fn photo_artifact_is_always_selfie_jpeg() {
        let photo = PhotoArtifact::from_jpeg(vec![0xFF, 0xD8], Utc::now());
        assert_eq!(photo.filename(), "selfie.jpg");
        assert_eq!(photo.media_type(), "image/jpeg");
        assert_eq!(photo.byte_len(), 2);
    }
}
