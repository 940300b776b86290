use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::Method,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use botherd_shared::{AddBotRequest, BotId, BotView, InventoryItem};

use crate::config::ServerConfig;
use crate::controller::BotController;
use crate::error::ServerError;
use crate::log_buffer::LogEntry;

#[derive(Clone)]
pub struct AppState {
    pub controller: BotController,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/info", get(server_info))
        .route("/api/status", get(status))
        .route("/api/logs", get(logs))
        .route("/api/bots", post(add_bot))
        .route("/api/bots/{id}", delete(delete_bot))
        .route("/api/bots/{id}/start", post(start_bot))
        .route("/api/bots/{id}/stop", post(stop_bot))
        .route("/api/bots/{id}/inventory", get(inventory))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    version: &'static str,
    default_host: String,
    default_port: u16,
    protocol_version: Option<String>,
    auto_reconnect: bool,
    auto_join: bool,
    log_capacity: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    bots: Vec<BotView>,
    logs: Vec<String>,
}

#[derive(Serialize)]
struct LogsResponse {
    capacity: usize,
    entries: Vec<LogEntry>,
}

#[derive(Serialize)]
struct InventoryResponse {
    items: Vec<InventoryItem>,
}

#[derive(Serialize)]
struct CommandResponse {
    success: bool,
}

#[derive(Serialize)]
struct AddBotResponse {
    success: bool,
    id: BotId,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        default_host: state.config.default_host.clone(),
        default_port: state.config.default_port,
        protocol_version: state.config.protocol_version.clone(),
        auto_reconnect: state.config.auto_reconnect,
        auto_join: state.config.auto_join,
        log_capacity: state.controller.log().capacity(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        bots: state.controller.registry().snapshot().await,
        logs: state.controller.log().snapshot(),
    })
}

async fn logs(State(state): State<AppState>) -> Json<LogsResponse> {
    let log = state.controller.log();
    Json(LogsResponse {
        capacity: log.capacity(),
        entries: log.entries(),
    })
}

async fn inventory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InventoryResponse>, ServerError> {
    let id = parse_id(&id)?;
    let items = state
        .controller
        .inventory(id)
        .await
        .ok_or(ServerError::BotNotFound(id))?;
    Ok(Json(InventoryResponse { items }))
}

/// Validate, add and immediately try to start a bot.
async fn add_bot(
    State(state): State<AppState>,
    payload: Result<Json<AddBotRequest>, JsonRejection>,
) -> Result<Json<AddBotResponse>, ServerError> {
    let Json(req) = payload?;
    let config = req.into_config(&state.config.default_host, state.config.default_port)?;
    let username = config.username.clone();

    let id = state.controller.add(config).await;
    state.controller.spawn_start(id);

    info!(bot = %id, user = %username, "Bot added via API");
    Ok(Json(AddBotResponse { success: true, id }))
}

async fn start_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ServerError> {
    let id = parse_id(&id)?;
    let success = state.controller.registry().find_by_id(id).await.is_some();
    if success {
        state.controller.spawn_start(id);
    }
    Ok(Json(CommandResponse { success }))
}

async fn stop_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ServerError> {
    let id = parse_id(&id)?;
    let success = state.controller.stop(id).await;
    Ok(Json(CommandResponse { success }))
}

async fn delete_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ServerError> {
    let id = parse_id(&id)?;
    let success = state.controller.delete(id).await;
    if success {
        info!(bot = %id, "Bot deleted via API");
    }
    Ok(Json(CommandResponse { success }))
}

fn parse_id(raw: &str) -> Result<BotId, ServerError> {
    raw.parse::<BotId>().map_err(ServerError::from)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP control surface");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use botherd_net::TcpLinkClient;
    use botherd_store::MemoryStore;
    use serde_json::Value;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use crate::controller::ControllerSettings;
    use crate::log_buffer::LogBuffer;
    use crate::reconnect::ReconnectPolicy;
    use crate::registry::BotRegistry;

    fn test_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let log = LogBuffer::new(25);
        let registry = Arc::new(BotRegistry::new(store.clone(), log.clone()));
        let settings = ControllerSettings {
            probe_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(2),
            protocol_version: None,
            reconnect: ReconnectPolicy::disabled(),
        };
        let controller =
            BotController::new(registry, Arc::new(TcpLinkClient::new()), log, settings);
        let config = ServerConfig {
            default_host: "127.0.0.1".into(),
            ..ServerConfig::default()
        };
        let state = AppState {
            controller,
            config: Arc::new(config),
        };
        (state, store)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn wait_for_status(app: &Router, expected: &str) -> Value {
        for _ in 0..300 {
            let (_, body) = call(app, "GET", "/api/status", None).await;
            if body["bots"][0]["status"] == expected {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bot never reached status {expected}");
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state();
        let app = build_router(state);
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_reports_defaults() {
        let (state, _) = test_state();
        let app = build_router(state);
        let (_, body) = call(&app, "GET", "/api/info", None).await;
        assert_eq!(body["default_host"], "127.0.0.1");
        assert_eq!(body["default_port"], 25565);
        assert_eq!(body["log_capacity"], 25);
    }

    #[tokio::test]
    async fn test_add_rejects_missing_username() {
        let (state, store) = test_state();
        let app = build_router(state);

        let (status, body) =
            call(&app, "POST", "/api/bots", Some(serde_json::json!({ "host": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Username"));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_add_rejects_malformed_body_as_json_400() {
        let (state, store) = test_state();
        let app = build_router(state);

        let bodies = [
            serde_json::json!({ "username": "Scout1", "authType": "cracked" }),
            serde_json::json!({ "username": "Scout1", "port": 99999 }),
            serde_json::json!({ "username": "Scout1", "port": "abc" }),
        ];
        for body in bodies {
            let (status, reply) = call(&app, "POST", "/api/bots", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(reply["error"].as_str().unwrap().starts_with("Invalid request"));
        }

        let (status, reply) = call(&app, "POST", "/api/bots", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["error"].is_string());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_add_unreachable_stays_offline() {
        let (state, store) = test_state();
        let log = state.controller.log().clone();
        let app = build_router(state);
        let port = closed_port().await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/bots",
            Some(serde_json::json!({
                "host": "127.0.0.1",
                "port": port,
                "username": "Scout1",
                "authType": "offline",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(store.configs().len(), 1);

        for _ in 0..300 {
            if log.snapshot().iter().any(|l| l.contains("unreachable")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (_, body) = call(&app, "GET", "/api/status", None).await;
        assert_eq!(body["bots"][0]["status"], "offline");
        assert_eq!(body["bots"][0]["username"], "Scout1");
        let logs = body["logs"].as_array().unwrap();
        assert!(logs.iter().any(|l| l.as_str().unwrap().contains("unreachable")));
    }

    #[tokio::test]
    async fn test_add_reachable_goes_online_then_delete() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept the probe and the session, greet the session.
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = socket.write_all(b"Welcome to the server\n").await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });

        let (state, store) = test_state();
        let app = build_router(state);

        let (_, body) = call(
            &app,
            "POST",
            "/api/bots",
            Some(serde_json::json!({ "port": port, "username": "Scout1" })),
        )
        .await;
        let id = body["id"].as_str().unwrap().to_string();

        wait_for_status(&app, "online").await;

        let (status, body) = call(&app, "GET", &format!("/api/bots/{id}/inventory"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"], serde_json::json!([]));

        let (_, body) = call(&app, "POST", &format!("/api/bots/{id}/stop"), None).await;
        assert_eq!(body["success"], true);
        wait_for_status(&app, "offline").await;

        let (_, body) = call(&app, "DELETE", &format!("/api/bots/{id}"), None).await;
        assert_eq!(body["success"], true);
        assert!(store.configs().is_empty());

        let (_, body) = call(&app, "GET", "/api/status", None).await;
        assert!(body["bots"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logs_structured() {
        let (state, _) = test_state();
        state.controller.log().append("hello");
        let app = build_router(state);

        let (status, body) = call(&app, "GET", "/api/logs", None).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "hello");
        assert!(entries[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let (state, _) = test_state();
        let app = build_router(state);
        let unknown = BotId::new();

        let (_, body) = call(&app, "POST", &format!("/api/bots/{unknown}/start"), None).await;
        assert_eq!(body["success"], false);

        let (_, body) = call(&app, "DELETE", &format!("/api/bots/{unknown}"), None).await;
        assert_eq!(body["success"], false);

        let (status, _) = call(&app, "GET", &format!("/api/bots/{unknown}/inventory"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "POST", "/api/bots/not-a-uuid/stop", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
