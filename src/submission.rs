//! Verification endpoint client.
//!
//! One multipart POST per submission, two parts (`passport`, `selfie`), and a
//! JSON verdict back. Retrying is the caller's decision; this client never
//! retries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use thiserror::Error;

use crate::config::{self, VERIFY_PATH};
use crate::document::DocumentArtifact;
use crate::encoder::PhotoArtifact;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    NotVerified,
}

impl Verdict {
    fn from_flag(verified: bool) -> Self {
        if verified {
            Self::Verified
        } else {
            Self::NotVerified
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Verification service returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Malformed verification response: {0}")]
    MalformedResponse(String),

    #[error("Could not build verification request: {0}")]
    RequestBuild(String),
}

impl SubmissionError {
    /// Transport failures and non-2xx answers are both network errors.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::HttpStatus { .. })
    }
}

/// Anything that can turn an artifact pair into a verdict.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn submit(&self, passport: &DocumentArtifact, photo: &PhotoArtifact) -> Result<Verdict, SubmissionError>;
}

// ═══════════════════════════════════════════════════════════
// SubmissionClient
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// `None` waits as long as the service takes.
    pub request_timeout: Option<Duration>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            base_url: config::DEFAULT_VERIFY_BASE_URL.to_string(),
            connect_timeout: config::CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }
}

impl SubmissionConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: config::verify_base_url(),
            request_timeout: config::submit_timeout(),
            ..Self::default()
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

/// HTTP client for `POST {base}/verify`.
pub struct SubmissionClient {
    endpoint: String,
    client: reqwest::Client,
}

impl SubmissionClient {
    pub fn new(config: &SubmissionConfig) -> Result<Self, SubmissionError> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SubmissionError::RequestBuild(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), VERIFY_PATH),
            client,
        })
    }

    pub fn from_env() -> Result<Self, SubmissionError> {
        Self::new(&SubmissionConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn build_form(passport: &DocumentArtifact, photo: &PhotoArtifact) -> Result<Form, SubmissionError> {
    let passport_part = Part::bytes(passport.bytes().to_vec())
        .file_name(passport.filename().to_string())
        .mime_str(passport.media_type())
        .map_err(|e| SubmissionError::RequestBuild(format!("passport content type: {e}")))?;
    let selfie_part = Part::bytes(photo.bytes().to_vec())
        .file_name(photo.filename())
        .mime_str(photo.media_type())
        .map_err(|e| SubmissionError::RequestBuild(format!("selfie content type: {e}")))?;

    Ok(Form::new()
        .part("passport", passport_part)
        .part("selfie", selfie_part))
}

/// Read the verdict out of a response body. Only `verified` matters; other
/// fields are ignored.
pub fn parse_verdict(body: &str) -> Result<Verdict, SubmissionError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SubmissionError::MalformedResponse(format!("body is not JSON: {e}")))?;
    match value.get("verified") {
        Some(serde_json::Value::Bool(flag)) => Ok(Verdict::from_flag(*flag)),
        Some(other) => Err(SubmissionError::MalformedResponse(format!(
            "`verified` is not a boolean: {other}"
        ))),
        None => Err(SubmissionError::MalformedResponse(
            "missing `verified` field".into(),
        )),
    }
}

#[async_trait]
impl Verifier for SubmissionClient {
    async fn submit(&self, passport: &DocumentArtifact, photo: &PhotoArtifact) -> Result<Verdict, SubmissionError> {
        let form = build_form(passport, photo)?;

        tracing::info!(
            endpoint = %self.endpoint,
            passport_bytes = passport.byte_len(),
            selfie_bytes = photo.byte_len(),
            "Submitting KYC documents"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SubmissionError::Network(format!("cannot connect to {}", self.endpoint))
                } else if e.is_timeout() {
                    SubmissionError::Network("request timed out".into())
                } else {
                    SubmissionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Verification service rejected submission");
            return Err(SubmissionError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SubmissionError::Network(format!("failed to read response: {e}")))?;
        let verdict = parse_verdict(&body)?;

        tracing::info!(?verdict, "Verification verdict received");
        Ok(verdict)
    }
}

// ═══════════════════════════════════════════════════════════
// MockVerifier
// ═══════════════════════════════════════════════════════════

/// Scripted verifier. Outcomes are served in order; the last one repeats.
pub struct MockVerifier {
    outcomes: Mutex<Vec<Result<Verdict, SubmissionError>>>,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn new(outcome: Result<Verdict, SubmissionError>) -> Self {
        Self::with_outcomes(vec![outcome])
    }

    pub fn with_outcomes(outcomes: Vec<Result<Verdict, SubmissionError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for MockVerifier {
    async fn submit(&self, _passport: &DocumentArtifact, _photo: &PhotoArtifact) -> Result<Verdict, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self
            .outcomes
            .lock()
            .map_err(|_| SubmissionError::Network("mock verifier poisoned".into()))?;
        match outcomes.len() {
            0 => Err(SubmissionError::Network("no scripted outcome".into())),
            1 => outcomes[0].clone(),
            _ => outcomes.remove(0),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
