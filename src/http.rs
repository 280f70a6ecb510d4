//! Axum routes for the auth service
//!
//! | Method | Path        | Success                              |
//! |--------|-------------|--------------------------------------|
//! | POST   | `/signup`   | 201, user, session cookie            |
//! | POST   | `/login`    | 200, user, session cookie            |
//! | DELETE | `/logout`   | 204, cookie cleared                  |
//! | GET    | `/me`       | 200, user                            |
//! | PUT    | `/password` | 200, user, rotated session cookie    |
//! | DELETE | `/sessions` | 200, revoked count, cookie cleared   |
//!
//! Request bodies are JSON. Responses carry the public [`User`] only.
//! Password hashing runs on the blocking pool so it does not stall the
//! async workers.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::http::{router, AppState};
//! use portcullis::layers::SecureAuthRouter;
//!
//! let state = AppState::new(Arc::new(auth), config.cookie.clone());
//! let app = router(state).with_auth_layers(&config, Arc::new(policy));
//! axum::serve(listener, app).await?;
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthService;
use crate::cookie::{build_clear_cookie, build_set_cookie, read_cookie, CookieSettings};
use crate::credentials::User;
use crate::error::{AuthError, Result};
use crate::session::IssuedSession;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub cookie: CookieSettings,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, cookie: CookieSettings) -> Self {
        Self { auth, cookie }
    }

    fn token(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.cookie.name)
    }

    fn require_token(&self, headers: &HeaderMap) -> Result<String> {
        self.token(headers).ok_or(AuthError::Unauthenticated)
    }
}

/// Email + password body for signup and login
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

/// Build the auth routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", delete(logout))
        .route("/me", get(me))
        .route("/password", put(change_password))
        .route("/sessions", delete(logout_all))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn signup(
    State(state): State<AppState>,
    body: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(body) = body.map_err(reject_body)?;
    let auth = Arc::clone(&state.auth);
    let (user, issued) = blocking(move || auth.signup(&body.email, &body.password)).await?;

    let mut response = (StatusCode::CREATED, Json(user)).into_response();
    if let Some(issued) = issued {
        set_cookie(&mut response, build_set_cookie(&state.cookie, &issued))?;
    }
    Ok(response)
}

async fn login(
    State(state): State<AppState>,
    body: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(body) = body.map_err(reject_body)?;
    let auth = Arc::clone(&state.auth);
    let login = blocking(move || auth.login(&body.email, &body.password)).await?;

    with_session(&state, login.user, &login.session, StatusCode::OK)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(token) = state.token(&headers) {
        state.auth.logout(&token);
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    set_cookie(&mut response, build_clear_cookie(&state.cookie))?;
    Ok(response)
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>> {
    let token = state.require_token(&headers)?;
    Ok(Json(state.auth.current_user(&token)?))
}

async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Response> {
    let token = state.require_token(&headers)?;
    let Json(body) = body.map_err(reject_body)?;

    let auth = Arc::clone(&state.auth);
    let (user, issued) = blocking(move || {
        let issued = auth.change_password(&token, &body.current_password, &body.new_password)?;
        let user = auth.current_user(issued.token.as_str())?;
        Ok((user, issued))
    })
    .await?;

    with_session(&state, user, &issued, StatusCode::OK)
}

async fn logout_all(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let token = state.require_token(&headers)?;
    let revoked = state.auth.logout_all(&token)?;

    let mut response = Json(RevokedResponse { revoked }).into_response();
    set_cookie(&mut response, build_clear_cookie(&state.cookie))?;
    Ok(response)
}

// ============================================================================
// Helpers
// ============================================================================

fn with_session(state: &AppState, user: User, issued: &IssuedSession, status: StatusCode) -> Result<Response> {
    let mut response = (status, Json(user)).into_response();
    set_cookie(&mut response, build_set_cookie(&state.cookie, issued))?;
    Ok(response)
}

fn set_cookie(response: &mut Response, cookie: String) -> Result<()> {
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| AuthError::Internal(format!("invalid Set-Cookie value: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}

fn reject_body(rejection: JsonRejection) -> AuthError {
    AuthError::InvalidInput(rejection.body_text())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Internal(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cors::OriginPolicy;
    use crate::error::ErrorResponse;
    use crate::layers::SecureAuthRouter;
    use crate::testing::{auth_service_with_clock, check_user_enumeration, test_config, ManualClock};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const ORIGIN: &str = "https://app.example.com";

    fn app() -> Router {
        let config = test_config();
        let auth = auth_service_with_clock(&config, ManualClock::new());
        let policy = OriginPolicy::from_config(&config).unwrap();
        router(AppState::new(Arc::new(auth), config.cookie.clone()))
            .with_auth_layers(&config, Arc::new(policy))
    }

    fn request(method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ORIGIN, ORIGIN);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("_portcullis_session={}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie_header(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .expect("Set-Cookie")
            .to_str()
            .unwrap()
            .to_string()
    }

    fn session_token(response: &Response) -> String {
        let cookie = set_cookie_header(response);
        let pair = cookie.split(';').next().unwrap();
        pair.split_once('=').unwrap().1.to_string()
    }

    async fn signup(app: &Router, email: &str) -> String {
        let response = send(
            app,
            request(Method::POST, "/signup", Some(json!({"email": email, "password": "hunter2"})), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        session_token(&response)
    }

    #[tokio::test]
    async fn test_signup_sets_http_only_cookie() {
        let app = app();
        let response = send(
            &app,
            request(
                Method::POST,
                "/signup",
                Some(json!({"email": "Alice@Example.com", "password": "hunter2"})),
                None,
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = set_cookie_header(&response);
        assert!(cookie.contains("; HttpOnly"));
        assert!(cookie.contains("; Secure"));
        assert!(cookie.contains("; SameSite=None"));
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), ORIGIN);

        let body = json_body(response).await;
        assert_eq!(body["email"], "alice@example.com");
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_me_with_and_without_cookie() {
        let app = app();
        let token = signup(&app, "alice@example.com").await;

        let response = send(&app, request(Method::GET, "/me", None, Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store, no-cache, must-revalidate, private"
        );
        let body = json_body(response).await;
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body.as_object().unwrap().len(), 3);

        let response = send(&app, request(Method::GET, "/me", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(body.error, "unauthenticated");
    }

    #[tokio::test]
    async fn test_disallowed_origin_is_forbidden() {
        let app = app();
        let token = signup(&app, "alice@example.com").await;

        let req = Request::builder()
            .uri("/me")
            .header(header::ORIGIN, "https://evil.example")
            .header(header::COOKIE, format!("_portcullis_session={}", token))
            .body(Body::empty())
            .unwrap();
        let response = send(&app, req).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let app = app();
        let token = signup(&app, "alice@example.com").await;

        let response = send(&app, request(Method::DELETE, "/logout", None, Some(&token))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(set_cookie_header(&response).contains("Max-Age=0"));

        let response = send(&app, request(Method::GET, "/me", None, Some(&token))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // logging out again is fine
        let response = send(&app, request(Method::DELETE, "/logout", None, Some(&token))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_login_failures_do_not_enumerate() {
        let app = app();
        signup(&app, "alice@example.com").await;

        let wrong = send(
            &app,
            request(Method::POST, "/login", Some(json!({"email": "alice@example.com", "password": "nope-nope"})), None),
        )
        .await;
        let unknown = send(
            &app,
            request(Method::POST, "/login", Some(json!({"email": "ghost@example.com", "password": "nope-nope"})), None),
        )
        .await;

        let wrong_status = wrong.status().as_u16();
        let unknown_status = unknown.status().as_u16();
        let wrong_body = json_body(wrong).await.to_string();
        let unknown_body = json_body(unknown).await.to_string();

        assert_eq!(wrong_status, 401);
        let result = check_user_enumeration((wrong_status, &wrong_body), (unknown_status, &unknown_body));
        assert!(!result.vulnerable, "{:?}", result.issues);
    }

    #[tokio::test]
    async fn test_login_then_me() {
        let app = app();
        signup(&app, "alice@example.com").await;

        let response = send(
            &app,
            request(Method::POST, "/login", Some(json!({"email": "alice@example.com", "password": "hunter2"})), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = session_token(&response);

        let response = send(&app, request(Method::GET, "/me", None, Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signup_error_statuses() {
        let app = app();
        signup(&app, "alice@example.com").await;

        let duplicate = send(
            &app,
            request(Method::POST, "/signup", Some(json!({"email": "ALICE@example.com", "password": "hunter2"})), None),
        )
        .await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let invalid = send(
            &app,
            request(Method::POST, "/signup", Some(json!({"email": "bob@example.com", "password": ""})), None),
        )
        .await;
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let malformed = send(&app, request(Method::POST, "/signup", Some(json!({"email": 7})), None)).await;
        assert_eq!(malformed.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_password_change_rotates_cookie() {
        let app = app();
        let old = signup(&app, "alice@example.com").await;

        let response = send(
            &app,
            request(
                Method::PUT,
                "/password",
                Some(json!({"current_password": "hunter2", "new_password": "correct horse"})),
                Some(&old),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let fresh = session_token(&response);
        assert_ne!(fresh, old);

        let response = send(&app, request(Method::GET, "/me", None, Some(&old))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = send(&app, request(Method::GET, "/me", None, Some(&fresh))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_everywhere() {
        let app = app();
        let first = signup(&app, "alice@example.com").await;
        let response = send(
            &app,
            request(Method::POST, "/login", Some(json!({"email": "alice@example.com", "password": "hunter2"})), None),
        )
        .await;
        let second = session_token(&response);

        let response = send(&app, request(Method::DELETE, "/sessions", None, Some(&first))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: RevokedResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(body.revoked, 2);

        let response = send(&app, request(Method::GET, "/me", None, Some(&second))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_lockout_returns_retry_after() {
        let app = app();
        signup(&app, "alice@example.com").await;

        let attempt = || {
            request(Method::POST, "/login", Some(json!({"email": "alice@example.com", "password": "wrong-pass"})), None)
        };
        for _ in 0..3 {
            assert_eq!(send(&app, attempt()).await.status(), StatusCode::UNAUTHORIZED);
        }

        let response = send(&app, attempt()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_some());
    }

    #[tokio::test]
    async fn test_preflight_is_answered_without_auth() {
        let app = app();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/me")
            .header(header::ORIGIN, ORIGIN)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, req).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), ORIGIN);
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    }
}
