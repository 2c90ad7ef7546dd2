//!
//! commentboard HTTP server
//! ------------------------
//! This module defines the Axum-based comments endpoint.
//!
//! Responsibilities:
//! - `GET /api/comments`: every comment, `created_at` ascending.
//! - `POST /api/comments`: validate `{ text, author }`, optionally check the
//!   caller's signed session against `author`, insert one record, return it.
//! - Any other method on the resource: 405 advertising `GET, POST`.
//! - Startup logging, CORS and graceful shutdown.
//!
//! The endpoint keeps no state of its own; everything lives in the store.

use std::net::SocketAddr;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_REQUEST_METHOD, ALLOW, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::config::{AuthMode, ServerConfig};
use crate::error::{AppError, AppResult};
use crate::identity::TokenSigner;
use crate::model::{CreateCommentRequest, CreateCommentResponse, ListCommentsResponse};
use crate::storage::{open_store, SharedStore};

pub const COMMENTS_PATH: &str = "/api/comments";

/// Who may write which `author`.
#[derive(Clone, Debug)]
pub enum AuthPolicy {
    /// Any caller may post as any author.
    TrustClient,
    /// Create requires a bearer session token, signed by this signer, for `author`.
    VerifySession(TokenSigner),
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub auth: AuthPolicy,
}

impl AppState {
    pub fn new(store: SharedStore, auth: AuthPolicy) -> Self { Self { store, auth } }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/", get(|| async { "commentboard ok" }))
        .route(
            COMMENTS_PATH,
            get(list_comments)
                .post(create_comment)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .layer(cors)
        .layer(middleware::from_fn(reject_plain_options))
        .with_state(state)
}

/// The CORS layer answers every OPTIONS request; only real preflights should get
/// that far on the comments resource.
async fn reject_plain_options(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS
        && req.uri().path() == COMMENTS_PATH
        && !req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
    {
        return method_not_allowed(Method::OPTIONS).await.into_response();
    }
    next.run(req).await
}

/// Build state from configuration and serve until Ctrl+C / SIGTERM.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = open_store(&config.store)?;
    let auth = match config.auth {
        AuthMode::TrustClient => {
            warn!(target: "startup", "auth=trust-client: any caller may post as any author");
            AuthPolicy::TrustClient
        }
        AuthMode::VerifySession => match &config.session_secret {
            Some(secret) => AuthPolicy::VerifySession(TokenSigner::new(secret.as_bytes())),
            None => {
                warn!(target: "startup", "BOARD_SESSION_SECRET not set; using a random secret, externally issued sessions will not verify");
                AuthPolicy::VerifySession(TokenSigner::generate().context("While generating a session secret")?)
            }
        },
    };
    info!(
        target: "startup",
        "commentboard starting: http_port={}, store={}, auth={}",
        config.http_port,
        store.describe(),
        config.auth.as_str()
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("While binding {}", addr))?;
    info!("Server running on {}", addr);

    axum::serve(listener, router(AppState::new(store, auth)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn list_comments(State(state): State<AppState>) -> AppResult<Json<ListCommentsResponse>> {
    let comments = state.store.list_ordered().await.map_err(|e| {
        error!(target: "comments", "list failed: {}", e);
        AppError::from(e)
    })?;
    Ok(Json(ListCommentsResponse { comments }))
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<CreateCommentResponse>> {
    // A body that is not a JSON object with string fields counts as missing fields.
    let req: CreateCommentRequest = serde_json::from_slice(&body).unwrap_or_default();
    let new = req.validate()?;
    authorize_author(&state.auth, &headers, &new.author)?;

    let comment = state.store.insert(new).await.map_err(|e| {
        error!(target: "comments", "insert failed: {}", e);
        AppError::from(e)
    })?;
    info!(target: "comments", id = %comment.id, author = %comment.author, "comment created");
    Ok(Json(CreateCommentResponse { comment }))
}

async fn method_not_allowed(method: Method) -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET, POST")], format!("Method {} Not Allowed", method))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn authorize_author(policy: &AuthPolicy, headers: &HeaderMap, author: &str) -> AppResult<()> {
    let AuthPolicy::VerifySession(signer) = policy else { return Ok(()); };
    let Some(token) = bearer_token(headers) else {
        return Err(AppError::auth("unauthorized", "Missing or invalid session"));
    };
    let claims = signer.verify(token, Utc::now().timestamp()).map_err(|e| {
        warn!(target: "comments", "rejected session: {}", e);
        AppError::auth("unauthorized", "Missing or invalid session")
    })?;
    if !claims.email.eq_ignore_ascii_case(author) {
        warn!(target: "comments", session_email = %claims.email, author = %author, "author does not match session");
        return Err(AppError::forbidden("forbidden", "Author does not match session"));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn trust_client_skips_checks() {
        assert!(authorize_author(&AuthPolicy::TrustClient, &HeaderMap::new(), "anyone").is_ok());
    }

    #[test]
    fn verify_session_checks_author() {
        use crate::identity::{Principal, SessionManager};
        let signer = TokenSigner::new("k");
        let session = SessionManager::new(signer.clone())
            .issue(Principal { user_id: "u".into(), email: "a@x.com".into() });
        let policy = AuthPolicy::VerifySession(signer);
        let h = headers_with(&format!("Bearer {}", session.access_token));
        assert!(authorize_author(&policy, &h, "a@x.com").is_ok());
        assert!(authorize_author(&policy, &h, "A@X.com").is_ok());
        // The stored author is untrimmed, so the check must be too.
        assert_eq!(authorize_author(&policy, &h, " a@x.com").unwrap_err().http_status(), 403);
        assert_eq!(authorize_author(&policy, &h, "b@x.com").unwrap_err().http_status(), 403);
        assert_eq!(authorize_author(&policy, &HeaderMap::new(), "a@x.com").unwrap_err().http_status(), 401);
        assert_eq!(authorize_author(&policy, &headers_with("Bearer junk"), "a@x.com").unwrap_err().http_status(), 401);
    }
}
