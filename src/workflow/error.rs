use thiserror::Error;

use super::WorkflowStep;
use crate::camera::CameraError;
use crate::document::ValidationError;
use crate::encoder::EncodeError;
use crate::submission::SubmissionError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Encoding(#[from] EncodeError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Cannot {action} while {step}")]
    InvalidTransition { action: &'static str, step: WorkflowStep },

    #[error("A submission is already in progress")]
    SubmissionInFlight,

    #[error("Camera is not ready yet")]
    CameraNotReady,

    #[error("No photo has been captured")]
    NoPhotoCaptured,

    #[error("The photo step was left before this operation finished")]
    Superseded,

    #[error("Internal lock error")]
    LockPoisoned,
}
