//! Mock Discord API for E2E tests.
//!
//! Starts an in-process HTTP server that serves the guild member role
//! endpoints and records every call it receives.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, delete, put, web};

/// One request received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCall {
    pub method: String,
    pub guild_id: u64,
    pub user_id: u64,
    pub role_id: u64,
    pub authorization: Option<String>,
    pub audit_reason: Option<String>,
}

/// Shared state for the mock Discord API.
#[derive(Default)]
pub struct MockDiscordState {
    pub calls: Vec<RoleCall>,
    /// Status returned for every request, 204 when unset
    pub respond_with: Option<u16>,
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn record(
    req: &HttpRequest,
    path: (u64, u64, u64),
    state: &Mutex<MockDiscordState>,
) -> HttpResponse {
    let (guild_id, user_id, role_id) = path;
    let mut state = state.lock().unwrap();
    state.calls.push(RoleCall {
        method: req.method().to_string(),
        guild_id,
        user_id,
        role_id,
        authorization: header(req, "Authorization"),
        audit_reason: header(req, "X-Audit-Log-Reason"),
    });

    match state.respond_with {
        None | Some(204) => HttpResponse::NoContent().finish(),
        Some(code) => HttpResponse::build(
            actix_web::http::StatusCode::from_u16(code).expect("valid status"),
        )
        .json(serde_json::json!({ "message": "Missing Permissions", "code": 50013 })),
    }
}

#[put("/guilds/{guild}/members/{user}/roles/{role}")]
async fn add_role(
    req: HttpRequest,
    path: web::Path<(u64, u64, u64)>,
    state: web::Data<Arc<Mutex<MockDiscordState>>>,
) -> HttpResponse {
    record(&req, path.into_inner(), &state)
}

#[delete("/guilds/{guild}/members/{user}/roles/{role}")]
async fn remove_role(
    req: HttpRequest,
    path: web::Path<(u64, u64, u64)>,
    state: web::Data<Arc<Mutex<MockDiscordState>>>,
) -> HttpResponse {
    record(&req, path.into_inner(), &state)
}

/// Mock Discord API server.
pub struct MockDiscord {
    pub api_base: String,
    pub state: Arc<Mutex<MockDiscordState>>,
}

impl MockDiscord {
    /// Start the mock on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockDiscordState::default()));

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let api_base = format!("http://127.0.0.1:{}/api/v10", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .service(
                    web::scope("/api/v10")
                        .service(add_role)
                        .service(remove_role),
                )
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        // Fire and forget; the server lives for the test process
        tokio::spawn(server);

        MockDiscord { api_base, state }
    }

    pub fn calls(&self) -> Vec<RoleCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Make every following request fail with `status`.
    pub fn fail_with(&self, status: u16) {
        self.state.lock().unwrap().respond_with = Some(status);
    }
}
