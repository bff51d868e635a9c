use serde::Serialize;

use crate::camera::{CameraConstraints, CameraError, CameraSession};
use crate::config;
use crate::document::{DocumentArtifact, DocumentSummary};
use crate::encoder::{PhotoArtifact, StillImage};

// ═══════════════════════════════════════════════════════════
// Public view types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    AwaitingPassport,
    AwaitingPhoto,
    Submitting,
    Complete,
}

impl WorkflowStep {
    /// Position in the 3-step progress indicator.
    pub fn number(&self) -> u8 {
        match self {
            Self::AwaitingPassport => 1,
            Self::AwaitingPhoto | Self::Submitting => 2,
            Self::Complete => 3,
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingPassport => write!(f, "awaiting passport"),
            Self::AwaitingPhoto => write!(f, "awaiting photo"),
            Self::Submitting => write!(f, "submitting"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    Off,
    Starting,
    Live { ready: bool },
    Unavailable,
    Captured,
    Encoding,
}

/// Everything the view layer needs, derived from the current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub step: WorkflowStep,
    pub step_number: u8,
    pub camera: CameraStatus,
    pub is_loading: bool,
    pub error: Option<String>,
    pub passport: Option<DocumentSummary>,
    pub has_photo: bool,
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub constraints: CameraConstraints,
    pub capture_quality: f32,
    pub max_document_bytes: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            constraints: CameraConstraints::default(),
            capture_quality: config::CAPTURE_JPEG_QUALITY,
            max_document_bytes: config::MAX_DOCUMENT_BYTES,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Internal state
// ═══════════════════════════════════════════════════════════

/// Progress inside the photo step.
#[derive(Debug)]
pub(crate) enum PhotoStage {
    Acquiring,
    Live(CameraSession),
    Unavailable(CameraError),
    Preview(StillImage),
    Encoding(StillImage),
}

impl PhotoStage {
    fn status(&self) -> CameraStatus {
        match self {
            Self::Acquiring => CameraStatus::Starting,
            Self::Live(session) => CameraStatus::Live {
                ready: session.is_ready(),
            },
            Self::Unavailable(_) => CameraStatus::Unavailable,
            Self::Preview(_) => CameraStatus::Captured,
            Self::Encoding(_) => CameraStatus::Encoding,
        }
    }
}

/// Artifacts live inside the variants that need them, so Submitting without
/// both is unrepresentable.
#[derive(Debug)]
pub(crate) enum Phase {
    AwaitingPassport,
    AwaitingPhoto {
        passport: DocumentArtifact,
        stage: PhotoStage,
    },
    Submitting {
        passport: DocumentArtifact,
        photo: PhotoArtifact,
    },
    Complete {
        passport: DocumentArtifact,
        photo: PhotoArtifact,
    },
}

impl Phase {
    pub(crate) fn step(&self) -> WorkflowStep {
        match self {
            Self::AwaitingPassport => WorkflowStep::AwaitingPassport,
            Self::AwaitingPhoto { .. } => WorkflowStep::AwaitingPhoto,
            Self::Submitting { .. } => WorkflowStep::Submitting,
            Self::Complete { .. } => WorkflowStep::Complete,
        }
    }

    pub(crate) fn passport(&self) -> Option<&DocumentArtifact> {
        match self {
            Self::AwaitingPassport => None,
            Self::AwaitingPhoto { passport, .. }
            | Self::Submitting { passport, .. }
            | Self::Complete { passport, .. } => Some(passport),
        }
    }

    pub(crate) fn photo(&self) -> Option<&PhotoArtifact> {
        match self {
            Self::Submitting { photo, .. } | Self::Complete { photo, .. } => Some(photo),
            _ => None,
        }
    }

    pub(crate) fn snapshot(&self, error: Option<&str>) -> WorkflowSnapshot {
        let step = self.step();
        let camera = match self {
            Self::AwaitingPhoto { stage, .. } => stage.status(),
            _ => CameraStatus::Off,
        };
        let is_loading = matches!(
            camera,
            CameraStatus::Starting | CameraStatus::Encoding | CameraStatus::Live { ready: false }
        ) || step == WorkflowStep::Submitting;

        WorkflowSnapshot {
            step,
            step_number: step.number(),
            camera,
            is_loading,
            error: error.map(str::to_string),
            passport: self.passport().map(DocumentArtifact::summary),
            has_photo: self.photo().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_numbers_follow_progress_bar() {
        assert_eq!(WorkflowStep::AwaitingPassport.number(), 1);
        assert_eq!(WorkflowStep::AwaitingPhoto.number(), 2);
        assert_eq!(WorkflowStep::Submitting.number(), 2);
        assert_eq!(WorkflowStep::Complete.number(), 3);
    }

    #[test]
    fn initial_snapshot_is_idle() {
        let snap = Phase::AwaitingPassport.snapshot(None);
        assert_eq!(snap.step, WorkflowStep::AwaitingPassport);
        assert_eq!(snap.camera, CameraStatus::Off);
        assert!(!snap.is_loading);
        assert!(snap.passport.is_none());
        assert!(!snap.has_photo);
    }

    #[test]
    fn snapshot_serializes_snake_case() {
        let snap = Phase::AwaitingPassport.snapshot(Some("oops"));
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["step"], "awaiting_passport");
        assert_eq!(json["camera"], "off");
        assert_eq!(json["error"], "oops");
    }
}
