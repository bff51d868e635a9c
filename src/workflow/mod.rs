//! KYC capture workflow: passport step → photo step → verdict.
//!
//! ```text
//! AwaitingPassport --accept file-------> AwaitingPhoto
//! AwaitingPhoto    --capture + encode--> Submitting
//! Submitting       --Verified----------> Complete
//! Submitting       --NotVerified/error-> AwaitingPhoto   (passport kept, photo dropped)
//! AwaitingPhoto    --back--------------> AwaitingPassport
//! Complete         --reset-------------> AwaitingPassport
//! ```
//!
//! All state sits behind one mutex that is never held across an await. The
//! suspension points (camera acquisition, preview and blob encoding,
//! submission) re-check the state when they resume: every entry into the photo step bumps
//! `photo_epoch`, and a result tagged with an older epoch is discarded. A
//! camera session that arrives late is released on arrival.
//!
//! Dropping the workflow drops the current phase, which releases any live
//! camera session.

mod error;
mod types;


pub use error::WorkflowError;
pub use types::{CameraStatus, WorkflowSettings, WorkflowSnapshot, WorkflowStep};

use std::sync::{Mutex, MutexGuard};

use crate::camera::{CameraDevice, DeviceCameraController};
use crate::document::{CandidateFile, DocumentArtifact, DocumentValidator};
use crate::encoder::{CaptureEncoder, ImageFormat, PhotoArtifact};
use crate::submission::{Verdict, Verifier};
use types::{Phase, PhotoStage};

const NOT_VERIFIED_MESSAGE: &str = "KYC not verified. Please retake your photo and try again.";

struct Inner {
    phase: Phase,
    last_error: Option<String>,
    photo_epoch: u64,
}

pub struct KycWorkflow<D, V> {
    camera: DeviceCameraController<D>,
    encoder: CaptureEncoder,
    validator: DocumentValidator,
    verifier: V,
    settings: WorkflowSettings,
    inner: Mutex<Inner>,
}

impl<D: CameraDevice, V: Verifier> KycWorkflow<D, V> {
    pub fn new(camera: D, verifier: V) -> Self {
        Self::with_settings(camera, verifier, WorkflowSettings::default())
    }

    pub fn with_settings(camera: D, verifier: V, settings: WorkflowSettings) -> Self {
        Self {
            camera: DeviceCameraController::new(camera),
            encoder: CaptureEncoder::new(settings.capture_quality),
            validator: DocumentValidator::new(settings.max_document_bytes),
            verifier,
            settings,
            inner: Mutex::new(Inner {
                phase: Phase::AwaitingPassport,
                last_error: None,
                photo_epoch: 0,
            }),
        }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn camera_device(&self) -> &D {
        self.camera.device()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, WorkflowError> {
        self.inner.lock().map_err(|_| WorkflowError::LockPoisoned)
    }

    // ── Views ───────────────────────────────────────────────

    pub fn step(&self) -> Result<WorkflowStep, WorkflowError> {
        Ok(self.lock()?.phase.step())
    }

    pub fn snapshot(&self) -> Result<WorkflowSnapshot, WorkflowError> {
        let inner = self.lock()?;
        Ok(inner.phase.snapshot(inner.last_error.as_deref()))
    }

    /// JPEG preview of the captured selfie, while it awaits confirmation.
    pub fn preview_jpeg(&self) -> Result<Option<Vec<u8>>, WorkflowError> {
        let inner = self.lock()?;
        Ok(match &inner.phase {
            Phase::AwaitingPhoto {
                stage: PhotoStage::Preview(still) | PhotoStage::Encoding(still),
                ..
            } => Some(still.preview_jpeg().to_vec()),
            _ => None,
        })
    }

    pub fn passport(&self) -> Result<Option<DocumentArtifact>, WorkflowError> {
        Ok(self.lock()?.phase.passport().cloned())
    }

    pub fn photo(&self) -> Result<Option<PhotoArtifact>, WorkflowError> {
        Ok(self.lock()?.phase.photo().cloned())
    }

    // ── Passport step ───────────────────────────────────────

    /// Validate and bind the passport, then open the camera.
    ///
    /// Camera failures do not fail this call; they show up in the snapshot
    /// and are retried with [`retry_camera`](Self::retry_camera).
    pub async fn submit_passport(&self, file: CandidateFile) -> Result<(), WorkflowError> {
        let epoch = {
            let mut inner = self.lock()?;
            if !matches!(inner.phase, Phase::AwaitingPassport) {
                return Err(invalid("upload a passport", &inner.phase));
            }
            let passport = match self.validator.accept(file) {
                Ok(passport) => passport,
                Err(e) => {
                    tracing::warn!(error = %e, "Passport rejected");
                    inner.last_error = Some(e.to_string());
                    return Err(e.into());
                }
            };
            tracing::info!(
                filename = passport.filename(),
                media_type = passport.media_type(),
                bytes = passport.byte_len(),
                "Passport accepted"
            );
            inner.phase = Phase::AwaitingPhoto {
                passport,
                stage: PhotoStage::Acquiring,
            };
            inner.last_error = None;
            begin_acquisition(&mut inner)
        };
        self.acquire_for(epoch).await
    }

    // ── Photo step ──────────────────────────────────────────

    pub async fn retry_camera(&self) -> Result<(), WorkflowError> {
        let epoch = {
            let mut inner = self.lock()?;
            match &inner.phase {
                Phase::AwaitingPhoto {
                    stage: PhotoStage::Unavailable(_),
                    ..
                } => {}
                other => return Err(invalid("retry the camera", other)),
            }
            inner.last_error = None;
            begin_acquisition(&mut inner)
        };
        self.acquire_for(epoch).await
    }

    /// Freeze the current frame as a mirrored still and release the camera.
    ///
    /// The frame is sampled under the lock; mirroring and the preview encode
    /// run on the blocking pool with the session still live.
    pub async fn capture(&self) -> Result<(), WorkflowError> {
        let (frame, epoch) = {
            let mut inner = self.lock()?;
            let epoch = inner.photo_epoch;
            let stage = match &mut inner.phase {
                Phase::AwaitingPhoto { stage, .. } => stage,
                other => return Err(invalid("capture a photo", other)),
            };
            let session = match stage {
                PhotoStage::Live(session) => session,
                PhotoStage::Acquiring | PhotoStage::Unavailable(_) => {
                    return Err(WorkflowError::CameraNotReady)
                }
                PhotoStage::Preview(_) | PhotoStage::Encoding(_) => return Err(already_captured()),
            };
            match self.encoder.sample(session) {
                Some(frame) => (frame, epoch),
                None => return Err(WorkflowError::CameraNotReady),
            }
        };

        let still = self.encoder.still_from_frame(frame).await;

        let mut inner = self.lock()?;
        if inner.photo_epoch != epoch {
            return Err(WorkflowError::Superseded);
        }
        let Inner {
            phase, last_error, ..
        } = &mut *inner;
        let stage = match phase {
            Phase::AwaitingPhoto { stage, .. } => stage,
            _ => return Err(WorkflowError::Superseded),
        };
        if !matches!(stage, PhotoStage::Live(_)) {
            // A concurrent capture got there first.
            return Err(already_captured());
        }

        let still = match still {
            Ok(still) => still,
            Err(e) => {
                tracing::warn!(error = %e, "Frame capture failed");
                *last_error = Some(e.to_string());
                return Err(e.into());
            }
        };

        if let PhotoStage::Live(mut session) = std::mem::replace(stage, PhotoStage::Preview(still)) {
            session.release();
        }
        *last_error = None;
        tracing::info!("Selfie captured");
        Ok(())
    }

    /// Discard the captured still and reopen the camera.
    pub async fn retake(&self) -> Result<(), WorkflowError> {
        let epoch = {
            let mut inner = self.lock()?;
            match &inner.phase {
                Phase::AwaitingPhoto {
                    stage: PhotoStage::Preview(_),
                    ..
                } => {}
                Phase::AwaitingPhoto {
                    stage: PhotoStage::Encoding(_),
                    ..
                } => return Err(WorkflowError::SubmissionInFlight),
                other => return Err(invalid("retake the photo", other)),
            }
            inner.last_error = None;
            begin_acquisition(&mut inner)
        };
        tracing::info!("Retaking selfie");
        self.acquire_for(epoch).await
    }

    /// Encode the captured still and submit it with the passport.
    ///
    /// `Verified` completes the workflow. `NotVerified` and submission errors
    /// return to the photo step with the passport still bound and the camera
    /// reopened for a retake.
    pub async fn confirm_photo(&self) -> Result<Verdict, WorkflowError> {
        let (still, epoch) = {
            let mut inner = self.lock()?;
            let epoch = inner.photo_epoch;
            let stage = match &mut inner.phase {
                Phase::AwaitingPhoto { stage, .. } => stage,
                Phase::Submitting { .. } => return Err(WorkflowError::SubmissionInFlight),
                other => return Err(invalid("submit", other)),
            };
            let still = match std::mem::replace(stage, PhotoStage::Acquiring) {
                PhotoStage::Preview(still) => still,
                PhotoStage::Encoding(still) => {
                    *stage = PhotoStage::Encoding(still);
                    return Err(WorkflowError::SubmissionInFlight);
                }
                other => {
                    *stage = other;
                    return Err(WorkflowError::NoPhotoCaptured);
                }
            };
            *stage = PhotoStage::Encoding(still.clone());
            (still, epoch)
        };

        let captured_at = still.captured_at();
        let encoded = self
            .encoder
            .to_blob(still, ImageFormat::Jpeg, self.settings.capture_quality)
            .await;

        let (passport, photo) = {
            let mut inner = self.lock()?;
            if inner.photo_epoch != epoch {
                return Err(WorkflowError::Superseded);
            }
            let current = std::mem::replace(&mut inner.phase, Phase::AwaitingPassport);
            match (current, encoded) {
                (
                    Phase::AwaitingPhoto {
                        passport,
                        stage: PhotoStage::Encoding(still),
                    },
                    Err(e),
                ) => {
                    tracing::warn!(error = %e, "Selfie encoding failed");
                    inner.phase = Phase::AwaitingPhoto {
                        passport,
                        stage: PhotoStage::Preview(still),
                    };
                    inner.last_error = Some(e.to_string());
                    return Err(e.into());
                }
                (
                    Phase::AwaitingPhoto {
                        passport,
                        stage: PhotoStage::Encoding(_),
                    },
                    Ok(blob),
                ) => {
                    let photo = PhotoArtifact::from_jpeg(blob.bytes, captured_at);
                    inner.phase = Phase::Submitting {
                        passport: passport.clone(),
                        photo: photo.clone(),
                    };
                    inner.last_error = None;
                    (passport, photo)
                }
                (other, _) => {
                    inner.phase = other;
                    return Err(WorkflowError::Superseded);
                }
            }
        };

        let outcome = self.verifier.submit(&passport, &photo).await;

        let epoch = {
            let mut inner = self.lock()?;
            match outcome {
                Ok(Verdict::Verified) => {
                    tracing::info!("KYC verified");
                    inner.phase = Phase::Complete { passport, photo };
                    inner.last_error = None;
                    return Ok(Verdict::Verified);
                }
                Ok(Verdict::NotVerified) => {
                    tracing::warn!("KYC not verified, returning to photo step");
                    inner.last_error = Some(NOT_VERIFIED_MESSAGE.to_string());
                }
                Err(ref e) => {
                    tracing::warn!(error = %e, "KYC submission failed, returning to photo step");
                    inner.last_error = Some(e.to_string());
                }
            }
            inner.phase = Phase::AwaitingPhoto {
                passport,
                stage: PhotoStage::Acquiring,
            };
            begin_acquisition(&mut inner)
        };

        self.acquire_for(epoch).await?;
        outcome.map_err(WorkflowError::from)
    }

    /// Leave the photo step. Any live camera session is released and the
    /// passport is discarded.
    pub fn back(&self) -> Result<(), WorkflowError> {
        let mut inner = self.lock()?;
        if !matches!(inner.phase, Phase::AwaitingPhoto { .. }) {
            return Err(invalid("go back", &inner.phase));
        }
        inner.photo_epoch += 1;
        let left = std::mem::replace(&mut inner.phase, Phase::AwaitingPassport);
        if let Phase::AwaitingPhoto {
            stage: PhotoStage::Live(mut session),
            ..
        } = left
        {
            session.release();
        }
        inner.last_error = None;
        tracing::info!("Returned to passport step");
        Ok(())
    }

    // ── Completion ──────────────────────────────────────────

    /// Start over from a completed verification. Both artifacts are dropped.
    pub fn reset(&self) -> Result<(), WorkflowError> {
        let mut inner = self.lock()?;
        if !matches!(inner.phase, Phase::Complete { .. }) {
            return Err(invalid("reset", &inner.phase));
        }
        inner.phase = Phase::AwaitingPassport;
        inner.last_error = None;
        tracing::info!("Workflow reset");
        Ok(())
    }

    // ── Camera plumbing ─────────────────────────────────────

    async fn acquire_for(&self, epoch: u64) -> Result<(), WorkflowError> {
        let result = self.camera.acquire(&self.settings.constraints).await;

        let mut inner = self.lock()?;
        let Inner {
            phase,
            last_error,
            photo_epoch,
        } = &mut *inner;
        match phase {
            Phase::AwaitingPhoto {
                stage: stage @ PhotoStage::Acquiring,
                ..
            } if *photo_epoch == epoch => match result {
                Ok(session) => *stage = PhotoStage::Live(session),
                Err(e) => {
                    // A submission failure recorded before re-acquiring stays visible.
                    *last_error = Some(match last_error.take() {
                        Some(earlier) => format!("{earlier}; {e}"),
                        None => e.to_string(),
                    });
                    *stage = PhotoStage::Unavailable(e);
                }
            },
            _ => {
                if let Ok(mut session) = result {
                    tracing::info!(session = %session.id(), "Photo step already left, releasing late camera session");
                    session.release();
                }
            }
        }
        Ok(())
    }
}

/// Mark a new acquisition for the photo step and return its epoch. Any
/// previous stage (and its session) is dropped.
fn begin_acquisition(inner: &mut Inner) -> u64 {
    inner.photo_epoch += 1;
    if let Phase::AwaitingPhoto { stage, .. } = &mut inner.phase {
        *stage = PhotoStage::Acquiring;
    }
    inner.photo_epoch
}

fn already_captured() -> WorkflowError {
    WorkflowError::InvalidTransition {
        action: "capture a photo",
        step: WorkflowStep::AwaitingPhoto,
    }
}

fn invalid(action: &'static str, phase: &Phase) -> WorkflowError {
    WorkflowError::InvalidTransition {
        action,
        step: phase.step(),
    }
}
