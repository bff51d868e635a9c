//! Shared fixtures: a mock verification endpoint on axum and candidate files.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use tokio::task::JoinHandle;

use crate::document::CandidateFile;

#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
}

struct EndpointState {
    status: StatusCode,
    body: String,
    hits: AtomicUsize,
    parts: Mutex<Vec<ReceivedPart>>,
}

/// `POST /verify` answering every request with a fixed status and body.
pub struct MockEndpoint {
    addr: SocketAddr,
    state: Arc<EndpointState>,
    server: JoinHandle<()>,
}

impl MockEndpoint {
    pub async fn start(status: u16, body: &str) -> Self {
        let state = Arc::new(EndpointState {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
            hits: AtomicUsize::new(0),
            parts: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/verify", post(handle_verify))
            .layer(DefaultBodyLimit::max(32 * 1024 * 1024))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, server }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn received_parts(&self) -> Vec<ReceivedPart> {
        self.state.parts.lock().unwrap().clone()
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle_verify(State(state): State<Arc<EndpointState>>, mut multipart: Multipart) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut received = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        received.push(ReceivedPart {
            name,
            file_name,
            content_type,
            len,
        });
    }
    state.parts.lock().unwrap().extend(received);

    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

/// Base URL of a port nothing listens on.
///
/// Racy: the port is freed before the URL is returned, so another process
/// can bind it in between.
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// A JPEG-typed passport candidate of `len` bytes.
pub fn jpeg_candidate(len: usize) -> CandidateFile {
    let mut bytes = vec![0u8; len];
    bytes[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    CandidateFile::new("passport.jpg", "image/jpeg", bytes)
}
