use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "KYC Capture";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Verification service used when `KYC_VERIFY_URL` is not set.
pub const DEFAULT_VERIFY_BASE_URL: &str = "https://kyc-urrb.onrender.com";

/// Path of the verification endpoint, appended to the base URL.
pub const VERIFY_PATH: &str = "/verify";

/// Largest passport image accepted (10 MiB, inclusive).
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

/// JPEG quality for both the capture preview and the submitted selfie.
pub const CAPTURE_JPEG_QUALITY: f32 = 0.8;

/// Filename the selfie part is always sent under.
pub const SELFIE_FILENAME: &str = "selfie.jpg";

/// Connect timeout for the verification endpoint. The request itself has no
/// timeout unless `KYC_SUBMIT_TIMEOUT_SECS` is set.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const ENV_VERIFY_URL: &str = "KYC_VERIFY_URL";
const ENV_SUBMIT_TIMEOUT: &str = "KYC_SUBMIT_TIMEOUT_SECS";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,kyc_capture=debug"
}

/// Base URL of the verification service, without trailing slash.
pub fn verify_base_url() -> String {
    std::env::var(ENV_VERIFY_URL)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_VERIFY_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Optional whole-request timeout for submissions.
pub fn submit_timeout() -> Option<Duration> {
    parse_timeout_secs(std::env::var(ENV_SUBMIT_TIMEOUT).ok().as_deref())
}

fn parse_timeout_secs(raw: Option<&str>) -> Option<Duration> {
    let secs: u64 = raw?.trim().parse().ok()?;
    (secs > 0).then(|| Duration::from_secs(secs))
}
