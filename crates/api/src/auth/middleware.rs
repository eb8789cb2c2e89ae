//! Authentication middleware for Axum

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE, LOCATION},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use relaybase_shared::{RecordStore, User};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;

use super::jwt::JwtManager;

/// Cookie written by the web client after login
pub const AUTH_COOKIE: &str = "pb_auth";

/// Authenticated user, inserted into request extensions by the middleware
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub auth_method: AuthMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    Cookie,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub store: Arc<dyn RecordStore>,
    /// Unset means every admin request is rejected
    pub admin_api_key: Option<String>,
}

#[derive(Deserialize)]
struct AuthCookie {
    token: String,
}

/// Token from the `pb_auth` cookie, which holds URL-encoded JSON `{"token": ...}`
fn extract_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let raw = cookie.trim().strip_prefix(AUTH_COOKIE)?.strip_prefix('=')?;
        let decoded = urlencoding::decode(raw).ok()?;
        serde_json::from_str::<AuthCookie>(&decoded)
            .ok()
            .map(|c| c.token)
            .filter(|t| !t.is_empty())
    })
}

/// Bearer header first, then the auth cookie
fn extract_bearer_token(headers: &HeaderMap) -> Option<(String, AuthMethod)> {
    if let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some((token.trim().to_string(), AuthMethod::Bearer));
        }
    }

    extract_token_from_cookie(headers).map(|token| (token, AuthMethod::Cookie))
}

async fn authenticate(auth_state: &AuthState, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let (token, auth_method) = extract_bearer_token(headers).ok_or(AuthError::MissingAuth)?;

    let claims = auth_state.jwt_manager.validate_token(&token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        AuthError::InvalidToken
    })?;

    let user = match auth_state.store.find_user(&claims.sub).await {
        Ok(user) => user,
        Err(e) if e.is_not_found() => return Err(AuthError::InvalidToken),
        Err(e) => return Err(AuthError::Internal(e.to_string())),
    };

    Ok(AuthUser { user, auth_method })
}

/// Middleware that requires authentication, answering 401 JSON otherwise
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match authenticate(&auth_state, request.headers()).await {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user.id,
                auth_method = ?auth_user.auth_method,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// Page-style guard: unauthenticated requests are sent to `/login`
pub async fn require_login(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth_state, request.headers()).await {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(AuthError::Internal(detail)) => AuthError::Internal(detail).into_response(),
        Err(_) => found("/login"),
    }
}

/// Like `require_login`, and unpaid users are sent to `/get`
pub async fn require_paid(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth_state, request.headers()).await {
        Ok(auth_user) if !auth_user.user.paid => {
            tracing::debug!(user_id = %auth_user.user.id, "require_paid: user has not paid");
            found("/get")
        }
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(AuthError::Internal(detail)) => AuthError::Internal(detail).into_response(),
        Err(_) => found("/login"),
    }
}

/// Guard for admin endpoints: `Authorization: Bearer <ADMIN_API_KEY>`
pub async fn require_admin(
    State(auth_state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(presented) = presented else {
        return AuthError::MissingAuth.into_response();
    };

    let accepted = auth_state
        .admin_api_key
        .as_deref()
        .is_some_and(|key| bool::from(presented.as_bytes().ct_eq(key.as_bytes())));

    if !accepted {
        tracing::warn!(
            path = %request.uri().path(),
            admin_enabled = auth_state.admin_api_key.is_some(),
            "require_admin: rejected admin request"
        );
        return AuthError::InvalidToken.into_response();
    }

    next.run(request).await
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "Authentication lookup failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use relaybase_shared::MemoryStore;
    use tower::ServiceExt;

    use crate::test_support::seed_user;

    const SECRET: &str = "test-auth-secret";
    const ADMIN_KEY: &str = "test-admin-key";

    async fn whoami(Extension(auth_user): Extension<AuthUser>) -> String {
        auth_user.user.email
    }

    fn app(store: Arc<MemoryStore>) -> Router {
        let auth_state = AuthState {
            jwt_manager: JwtManager::new(SECRET, 1),
            store,
            admin_api_key: Some(ADMIN_KEY.to_string()),
        };

        Router::new()
            .route(
                "/api",
                get(whoami).route_layer(middleware::from_fn_with_state(
                    auth_state.clone(),
                    require_auth,
                )),
            )
            .route(
                "/page",
                get(whoami).route_layer(middleware::from_fn_with_state(
                    auth_state.clone(),
                    require_login,
                )),
            )
            .route(
                "/paid",
                get(whoami).route_layer(middleware::from_fn_with_state(
                    auth_state.clone(),
                    require_paid,
                )),
            )
            .route(
                "/admin",
                get(|| async { "admin" })
                    .route_layer(middleware::from_fn_with_state(auth_state, require_admin)),
            )
    }

    fn token_for(user: &User) -> String {
        JwtManager::new(SECRET, 1).generate_token(&user.id).unwrap()
    }

    fn cookie_for(token: &str) -> String {
        let json = serde_json::json!({ "token": token, "model": {} }).to_string();
        format!("theme=dark; {}={}", AUTH_COOKIE, urlencoding::encode(&json))
    }

    async fn call(app: Router, path: &str, header: Option<(&str, String)>) -> Response {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_cookie_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie_for("abc").parse().unwrap());
        assert_eq!(
            extract_bearer_token(&headers),
            Some(("abc".to_string(), AuthMethod::Cookie))
        );

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "pb_auth=not-json".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_bearer_header_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        headers.insert(COOKIE, cookie_for("from-cookie").parse().unwrap());

        assert_eq!(
            extract_bearer_token(&headers),
            Some(("from-header".to_string(), AuthMethod::Bearer))
        );
    }

    #[tokio::test]
    async fn test_require_auth_accepts_bearer_and_cookie() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(&store, "alice@example.com").await;
        let token = token_for(&user);

        let response = call(
            app(store.clone()),
            "/api",
            Some(("authorization", format!("Bearer {token}"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "alice@example.com");

        let response = call(app(store), "/api", Some(("cookie", cookie_for(&token)))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_require_auth_rejects_with_json() {
        let store = Arc::new(MemoryStore::new());

        let response = call(app(store.clone()), "/api", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["code"], 401);

        let response = call(
            app(store),
            "/api",
            Some(("authorization", "Bearer garbage".to_string())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_for_deleted_user_rejected() {
        let store = Arc::new(MemoryStore::new());
        let token = JwtManager::new(SECRET, 1).generate_token("ghost").unwrap();

        let response = call(
            app(store),
            "/api",
            Some(("authorization", format!("Bearer {token}"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_login_redirects() {
        let store = Arc::new(MemoryStore::new());

        let response = call(app(store), "/page", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_require_paid_redirects_unpaid_to_get() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(&store, "alice@example.com").await;
        let token = token_for(&user);

        let response = call(app(store.clone()), "/paid", None).await;
        assert_eq!(response.headers()[LOCATION], "/login");

        let response = call(
            app(store.clone()),
            "/paid",
            Some(("authorization", format!("Bearer {token}"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/get");

        store.set_user_paid(&user.id, true).await.unwrap();
        let response = call(
            app(store),
            "/paid",
            Some(("authorization", format!("Bearer {token}"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_require_admin_checks_key() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(&store, "alice@example.com").await;

        let response = call(app(store.clone()), "/admin", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(
            app(store.clone()),
            "/admin",
            Some(("authorization", format!("Bearer {}", token_for(&user)))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(
            app(store),
            "/admin",
            Some(("authorization", format!("Bearer {ADMIN_KEY}"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "admin");
    }

    #[tokio::test]
    async fn test_require_admin_disabled_without_key() {
        let auth_state = AuthState {
            jwt_manager: JwtManager::new(SECRET, 1),
            store: Arc::new(MemoryStore::new()),
            admin_api_key: None,
        };
        let app = Router::new().route(
            "/admin",
            get(|| async { "admin" })
                .route_layer(middleware::from_fn_with_state(auth_state, require_admin)),
        );

        let response = call(
            app,
            "/admin",
            Some(("authorization", format!("Bearer {ADMIN_KEY}"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
