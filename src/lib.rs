pub mod camera; // Device camera lifecycle (RAII sessions)
pub mod config;
pub mod document; // Passport validation
pub mod encoder; // Frame capture, mirroring, JPEG/PNG encoding
pub mod submission; // POST /verify client
pub mod workflow; // Passport → photo → verdict state machine

#[cfg(test)]
mod test_support;

pub use camera::{CameraConstraints, CameraDevice, CameraError, CameraSession, DeviceCameraController, MockCamera, VideoStream};
pub use document::{CandidateFile, DocumentArtifact, DocumentValidator, ValidationError};
pub use encoder::{CaptureEncoder, EncodeError, ImageFormat, PhotoArtifact};
pub use submission::{MockVerifier, SubmissionClient, SubmissionConfig, SubmissionError, Verdict, Verifier};
pub use workflow::{CameraStatus, KycWorkflow, WorkflowError, WorkflowSettings, WorkflowSnapshot, WorkflowStep};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// [`config::default_log_filter`]. Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
