//! In-process stand-in for the Withings API, used by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, State};
use axum::http::{HeaderMap, Uri, header};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::client::ApiClient;
use crate::credentials::now_millis;

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub form: HashMap<String, String>,
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> Value + Send + Sync>;

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Responder,
}

/// Mock server that records every request and answers with the envelope
/// produced by the responder.
pub(crate) struct MockApi {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockApi {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            requests: requests.clone(),
            responder: Arc::new(responder),
        };

        let handle = tokio::spawn(async move {
            let app = Router::new().fallback(handle_request).with_state(state);
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            handle,
        }
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::default().with_base_url(&self.base_url)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received on `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_request(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let request = RecordedRequest {
        path: uri.path().to_owned(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        form,
    };
    let reply = (state.responder)(&request);
    state.requests.lock().unwrap().push(request);
    Json(reply)
}

/// Successful `requesttoken` envelope for user `42`.
pub(crate) fn token_reply(access: &str, refresh: &str, expires_in: u64) -> Value {
    json!({
        "status": 0,
        "body": {
            "userid": "42",
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
            "scope": "user.info,user.metrics",
            "token_type": "Bearer"
        }
    })
}

/// An expiry one day from now.
pub(crate) fn far_future() -> u64 {
    now_millis() + 86_400_000
}
