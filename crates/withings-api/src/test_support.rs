//! Mock Withings API for the wrapper tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, State};
use axum::http::Uri;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use withings_core::{ApiClient, Credentials, TokenData};

use crate::Withings;

/// Path and form fields of one received request.
#[derive(Debug, Clone)]
pub(crate) struct Received {
    pub path: String,
    pub form: HashMap<String, String>,
}

type Responder = Arc<dyn Fn(&Received) -> Value + Send + Sync>;

#[derive(Clone)]
struct MockState {
    received: Arc<Mutex<Vec<Received>>>,
    responder: Responder,
}

pub(crate) struct MockApi {
    pub session: Withings,
    received: Arc<Mutex<Vec<Received>>>,
    handle: JoinHandle<()>,
}

impl MockApi {
    /// Start the mock and a session whose token is valid for a day.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Received) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            received: received.clone(),
            responder: Arc::new(responder),
        };
        let handle = tokio::spawn(async move {
            let app = Router::new().fallback(respond).with_state(state);
            axum::serve(listener, app).await.unwrap();
        });

        let expires = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
            + 86_400_000;
        let credentials = Credentials::from_token_data(
            "cid",
            "csecret",
            TokenData {
                user_id: Some("363".into()),
                access_token: "at_live".into(),
                refresh_token: Some("rt_live".into()),
                expires,
            },
        );
        let client = ApiClient::new(reqwest::Client::new()).with_base_url(format!("http://{addr}"));

        Self {
            session: Withings::new(client, Arc::new(credentials)),
            received,
            handle,
        }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    State(state): State<MockState>,
    uri: Uri,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let received = Received {
        path: uri.path().to_owned(),
        form,
    };
    let reply = (state.responder)(&received);
    state.received.lock().unwrap().push(received);
    Json(reply)
}
