use crate::auth::{ Identity, TokenSigner };
use crate::cli::Args;
use crate::directory::FileDirectory;
use crate::error::ChatError;
use crate::service::MessagingService;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    extract::{ rejection::JsonRejection, FromRequestParts, Path, State },
    response::IntoResponse,
    http::{ header, request::Parts, HeaderMap, HeaderValue, StatusCode },
    Json,
};
use chrono::Utc;
use serde::{ Deserialize, Serialize };
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error, warn };

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MessagingService>,
    pub signer: Arc<TokenSigner>,
    pub directory: Arc<FileDirectory>,
    pub api_key: Option<String>,
}

/// Caller identity taken from `Authorization: Bearer <token>`.
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = TokenSigner::bearer(header)?;
        Ok(AuthUser(state.signer.verify(token, Utc::now())?))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub to_employee_id: Option<String>,
    pub text: Option<String>,
    pub content: Option<String>,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    employees: usize,
}

pub fn router(state: AppState, cors_origin: Option<&str>) -> Router {
    let cors = match cors_origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any),
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/messages", post(send_handler))
        .route("/api/messages/contacts", get(contacts_handler))
        .route("/api/messages/unread-summary", get(unread_summary_handler))
        .route("/api/messages/thread/{conversation_id}", get(thread_handler))
        .route("/api/messages/{conversation_id}/mark-seen", post(mark_seen_handler))
        .route("/api/directory/reload", post(reload_directory_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    state: AppState,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(state, args.cors_origin.as_deref());

    if let Some((cert_path, key_path)) = args.tls_paths() {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
        })?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn send_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ChatError> {
    let Json(req) = body.map_err(|rejection| {
        warn!("Malformed send request from {}: {}", me.employee_id, rejection.body_text());
        ChatError::InvalidInput("Invalid request body".to_string())
    })?;
    let to = req.to_employee_id.unwrap_or_default();
    let text = req.text.filter(|t| !t.is_empty()).or(req.content).unwrap_or_default();

    let receipt = state.service.send(&me.employee_id, &to, &text, Utc::now()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Message sent",
            "data": receipt.message,
            "conversationId": receipt.conversation_id,
        })),
    ))
}

async fn contacts_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(state.service.list_contacts(&me.employee_id).await?))
}

async fn thread_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(state.service.get_thread(&me.employee_id, &conversation_id).await?))
}

async fn mark_seen_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    let ack = state.service.mark_seen(&me.employee_id, &conversation_id).await?;
    Ok(Json(json!({
        "message": "Messages marked as seen",
        "conversationId": ack.conversation_id,
        "marked": ack.marked,
    })))
}

async fn unread_summary_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(state.service.unread_summary(&me.employee_id).await?))
}

async fn reload_directory_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(required) = &state.api_key {
        let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
        if provided != Some(required.as_str()) {
            warn!("Directory reload rejected: bad or missing API key");
            return ChatError::Unauthorized("Unauthorized".to_string()).into_response();
        }
    }

    let (code, success, message) = match state.directory.reload_if_changed().await {
        Ok(true) => (StatusCode::OK, true, "Directory reloaded".to_string()),
        Ok(false) => (StatusCode::OK, true, "Directory unchanged".to_string()),
        Err(e) => {
            error!("Directory reload failed: {}", e);
            (StatusCode::BAD_REQUEST, false, format!("Reload error: {}", e))
        }
    };
    let employees = state.directory.len().await;
    (code, Json(ReloadResponse { success, message, employees })).into_response()
}
