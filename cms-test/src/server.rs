//! Exposes an in-process stand-in for the CMS for use in integration tests.
//!
//! ```
//! use cms_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/api/auth/local");
//!    // use the URL in tests...
//! }
//! ```
//!
//! The server implements the four endpoints used by the stress test: login, upload, patient and
//! treatment creation. Every request is recorded, see [`Recorded`], and failures can be injected
//! through [`MockConfig`].

use std::collections::BTreeSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const JWT_SECRET: &[u8] = b"cms-test-secret";
const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// How the upload endpoint answers.
#[derive(Debug, Clone, Default)]
pub enum UploadBehavior {
    /// Store every upload.
    #[default]
    Accept,
    /// Reject every upload with `500 Internal Server Error`.
    RejectAll,
    /// Reject the uploads with the given 1-based call numbers, counted across the server.
    RejectCalls(BTreeSet<usize>),
    /// Wait before answering, so clients with a shorter timeout fail at the network level.
    Stall(Duration),
}

/// Behavior of a [`TestServer`].
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// The only identifier accepted by the login endpoint.
    pub identifier: String,
    /// The only password accepted by the login endpoint.
    pub password: String,
    /// How uploads are answered.
    pub uploads: UploadBehavior,
    /// Reject all patient creations with `400 Bad Request`.
    pub reject_patients: bool,
    /// Reject all treatment creations with `400 Bad Request`.
    pub reject_treatments: bool,
    /// Answer treatment creations with `201 Created`, but without the created entity.
    pub bare_treatments: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            identifier: "stress".to_owned(),
            password: "stress-password".to_owned(),
            uploads: UploadBehavior::Accept,
            reject_patients: false,
            reject_treatments: false,
            bare_treatments: false,
        }
    }
}

/// Everything the server has seen so far.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    /// Number of login attempts, successful or not.
    pub auth_calls: usize,
    /// Number of authorized upload requests, including rejected ones.
    pub upload_calls: usize,
    /// Number of authorized patient creation requests, including rejected ones.
    pub patient_calls: usize,
    /// Number of authorized treatment creation requests, including rejected ones.
    pub treatment_calls: usize,
    /// All distinct bearer tokens presented on authorized requests.
    pub tokens: BTreeSet<String>,
    /// File names of stored uploads.
    pub filenames: Vec<String>,
    /// Sizes of stored uploads in bytes.
    pub upload_sizes: Vec<usize>,
    /// The `data` objects of created patients.
    pub patients: Vec<Value>,
    /// The `data` objects of created treatments.
    pub treatments: Vec<Value>,
}

#[derive(Debug)]
struct MockState {
    config: MockConfig,
    next_id: AtomicU64,
    recorded: Mutex<Recorded>,
}

type SharedState = Arc<MockState>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: u64,
    jti: String,
    exp: u64,
}

/// An in-process CMS for use in integration tests.
///
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: SharedState,
}

impl TestServer {
    /// Starts a server that accepts everything.
    pub async fn new() -> Self {
        Self::with_config(MockConfig::default()).await
    }

    /// Starts a server with the given behavior.
    pub async fn with_config(config: MockConfig) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            config,
            next_id: AtomicU64::new(1),
            recorded: Mutex::new(Recorded::default()),
        });
        let router = routes(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// The configuration this server was started with.
    pub fn config(&self) -> &MockConfig {
        &self.state.config
    }

    /// Returns a snapshot of all requests recorded so far.
    pub fn recorded(&self) -> Recorded {
        self.state.recorded.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/api/auth/local", post(login))
        .route("/api/upload", post(upload))
        .route("/api/patients", post(create_patient))
        .route("/api/treatments", post(create_treatment))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

fn error_response(status: StatusCode, name: &str, message: &str) -> Response {
    let body = json!({
        "data": null,
        "error": {
            "status": status.as_u16(),
            "name": name,
            "message": message,
        }
    });
    (status, Json(body)).into_response()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Validates the bearer token and records it.
fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    let unauthorized = || {
        error_response(
            StatusCode::UNAUTHORIZED,
            "UnauthorizedError",
            "Missing or invalid credentials",
        )
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET),
        &Validation::default(),
    )
    .map_err(|_| unauthorized())?;

    state
        .recorded
        .lock()
        .unwrap()
        .tokens
        .insert(token.to_owned());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    identifier: String,
    password: String,
}

async fn login(State(state): State<SharedState>, Json(body): Json<LoginBody>) -> Response {
    state.recorded.lock().unwrap().auth_calls += 1;

    let config = &state.config;
    if body.identifier != config.identifier || body.password != config.password {
        return error_response(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "Invalid identifier or password",
        );
    }

    let claims = Claims {
        id: 1,
        jti: uuid::Uuid::new_v4().to_string(),
        exp: now() + 3600,
    };
    let jwt = match jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET),
    ) {
        Ok(jwt) => jwt,
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                &err.to_string(),
            );
        }
    };

    let user = json!({ "id": 1, "username": body.identifier });
    Json(json!({ "jwt": jwt, "user": user })).into_response()
}

async fn upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let call = {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.upload_calls += 1;
        recorded.upload_calls
    };

    // Drain the body before deciding, so rejections reach the client as a proper response.
    let mut files = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("files") {
                    continue;
                }
                let name = field.file_name().unwrap_or("unnamed").to_owned();
                match field.bytes().await {
                    Ok(bytes) => files.push((name, bytes.len())),
                    Err(err) => return err.into_response(),
                }
            }
            Ok(None) => break,
            Err(err) => return err.into_response(),
        }
    }

    match &state.config.uploads {
        UploadBehavior::Accept => {}
        UploadBehavior::RejectAll => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "upload rejected",
            );
        }
        UploadBehavior::RejectCalls(calls) => {
            if calls.contains(&call) {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "upload rejected",
                );
            }
        }
        UploadBehavior::Stall(duration) => tokio::time::sleep(*duration).await,
    }

    if files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "ValidationError", "Files are empty");
    }

    let mut recorded = state.recorded.lock().unwrap();
    let response: Vec<Value> = files
        .into_iter()
        .map(|(name, size)| {
            recorded.filenames.push(name.clone());
            recorded.upload_sizes.push(size);
            json!({
                "id": state.next_id.fetch_add(1, Ordering::Relaxed),
                "documentId": uuid::Uuid::new_v4().simple().to_string(),
                "name": name,
                "size": size,
            })
        })
        .collect();

    (StatusCode::CREATED, Json(response)).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    data: Value,
}

async fn create_patient(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    state.recorded.lock().unwrap().patient_calls += 1;

    if state.config.reject_patients {
        return error_response(StatusCode::BAD_REQUEST, "ValidationError", "patient rejected");
    }

    create_entity(&state, body.data, |recorded, data| {
        recorded.patients.push(data)
    })
}

async fn create_treatment(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    state.recorded.lock().unwrap().treatment_calls += 1;

    if state.config.reject_treatments {
        return error_response(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "treatment rejected",
        );
    }

    if state.config.bare_treatments {
        state.recorded.lock().unwrap().treatments.push(body.data);
        return (StatusCode::CREATED, Json(json!({ "ok": true }))).into_response();
    }

    create_entity(&state, body.data, |recorded, data| {
        recorded.treatments.push(data)
    })
}

fn create_entity(
    state: &MockState,
    data: Value,
    record: impl FnOnce(&mut Recorded, Value),
) -> Response {
    let Value::Object(mut entity) = data.clone() else {
        return error_response(StatusCode::BAD_REQUEST, "ValidationError", "invalid data");
    };
    record(&mut state.recorded.lock().unwrap(), data);

    entity.insert(
        "id".to_owned(),
        state.next_id.fetch_add(1, Ordering::Relaxed).into(),
    );
    entity.insert(
        "documentId".to_owned(),
        uuid::Uuid::new_v4().simple().to_string().into(),
    );

    (
        StatusCode::CREATED,
        Json(json!({ "data": entity, "meta": {} })),
    )
        .into_response()
}
