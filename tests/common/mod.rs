//! In-process stand-ins for the governance and cluster-manager services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};
use tokio::sync::Notify;

use notebook_provisioner::{
    ClusterManagerClient, ClusterManagerConfig, GovernanceClient, GovernanceConfig,
};

pub const MINIO_ENDPOINT: &str = "minio.test:9000";

/// Scripted responses and recorded requests.
pub struct MockState {
    pub credentials: Mutex<(u16, Value)>,
    pub credentials_delay: Mutex<Duration>,
    pub create: Mutex<(u16, Value)>,
    pub create_delay: Mutex<Duration>,
    /// Fired when a create request arrives, before its scripted delay.
    pub create_started: Notify,
    pub delete_status: Mutex<u16>,
    /// `"<METHOD> <path> <authorization>"` per request, in arrival order.
    pub requests: Mutex<Vec<String>>,
    pub create_bodies: Mutex<Vec<Value>>,
    pub create_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            credentials: Mutex::new((200, json!({"access_key": "AK", "secret_key": "SK"}))),
            credentials_delay: Mutex::new(Duration::ZERO),
            create: Mutex::new((201, json!({"master_url": "spark://10.0.0.5:7077"}))),
            create_delay: Mutex::new(Duration::ZERO),
            create_started: Notify::new(),
            delete_status: Mutex::new(200),
            requests: Mutex::new(Vec::new()),
            create_bodies: Mutex::new(Vec::new()),
            create_queries: Mutex::new(Vec::new()),
        }
    }
}

impl MockState {
    pub fn set_credentials(&self, status: u16, body: Value) {
        *self.credentials.lock().unwrap() = (status, body);
    }

    pub fn set_create(&self, status: u16, body: Value) {
        *self.create.lock().unwrap() = (status, body);
    }

    pub fn set_delete_status(&self, status: u16) {
        *self.delete_status.lock().unwrap() = status;
    }

    pub fn set_credentials_delay(&self, delay: Duration) {
        *self.credentials_delay.lock().unwrap() = delay;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, method: &str, path: &str, headers: &HeaderMap) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("<none>");
        self.requests
            .lock()
            .unwrap()
            .push(format!("{method} {path} {auth}"));
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn base_url(&self) -> url::Url {
        format!("http://{}", self.addr).parse().unwrap()
    }

    pub fn governance_config(&self) -> GovernanceConfig {
        GovernanceConfig::new(self.base_url(), MINIO_ENDPOINT)
            .with_secure(true)
            .with_timeout(Duration::from_secs(5))
    }

    pub fn cluster_config(&self) -> ClusterManagerConfig {
        ClusterManagerConfig::new(self.base_url()).with_timeout(Duration::from_secs(5))
    }

    pub fn governance_client(&self) -> GovernanceClient {
        GovernanceClient::new(self.governance_config())
    }

    pub fn cluster_client(&self) -> ClusterManagerClient {
        ClusterManagerClient::new(self.cluster_config())
    }
}

async fn credentials(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.record("GET", "/credentials/", &headers);
    let delay = *state.credentials_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    let (status, body) = state.credentials.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), Json(body))
}

async fn create_cluster(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record("POST", "/clusters", &headers);
    state.create_bodies.lock().unwrap().push(body);
    state.create_queries.lock().unwrap().push(query);
    state.create_started.notify_one();
    let delay = *state.create_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    let (status, body) = state.create.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), Json(body))
}

async fn delete_cluster(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    state.record("DELETE", "/clusters", &headers);
    let status = *state.delete_status.lock().unwrap();
    StatusCode::from_u16(status).unwrap()
}

/// Serve both services on one ephemeral loopback port.
pub async fn start_mock_backend() -> MockBackend {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/credentials/", get(credentials))
        .route("/clusters", post(create_cluster).delete(delete_cluster))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend { addr, state }
}
