//! HTTP stand-in for a node's device API

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode, Uri},
    Router,
};

/// A request received by the stub device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct DeviceState {
    requests: Vec<RecordedRequest>,
    statuses: VecDeque<u16>,
    delay: Duration,
}

/// Axum server on an ephemeral local port that answers every request.
///
/// Responds with queued status codes in order, then 200 once the queue is
/// empty.
#[derive(Clone)]
pub struct StubDevice {
    addr: SocketAddr,
    state: Arc<Mutex<DeviceState>>,
}

impl StubDevice {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(DeviceState::default()));
        let router = Router::new()
            .fallback(record_request)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state }
    }

    /// Start with a fixed sequence of response codes.
    pub async fn with_statuses(statuses: &[u16]) -> Self {
        let device = Self::start().await;
        device.state.lock().unwrap().statuses.extend(statuses);
        device
    }

    /// Start a device that records each request, then waits `delay`
    /// before answering.
    pub async fn with_delay(delay: Duration) -> Self {
        let device = Self::start().await;
        device.state.lock().unwrap().delay = delay;
        device
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

async fn record_request(
    State(state): State<Arc<Mutex<DeviceState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let (status, delay) = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body: body.to_vec(),
        });
        (state.statuses.pop_front().unwrap_or(200), state.delay)
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}
