//! Credential transport: JWT bearer tokens.
//!
//! The layer validates the token signature and lifetime and attaches an
//! [`AuthContext`] carrying the raw claims. It does not decide who the
//! caller is; that is the identity resolver's job, against stored records.
//!
//! # Example
//!
//! ```rust,ignore
//! use bizdash_core::middleware::auth::{AuthConfig, AuthLayer};
//!
//! let config = AuthConfig::builder().jwt_secret("dev-secret").build();
//! let app = Router::new()
//!     .route("/api/v1/me", get(me))
//!     .layer(AuthLayer::from_config(config)?);
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::authz::{Credential, Identity};

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token validation error: {0}")]
    ValidationError(String),

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication credentials are required",
            ),
            Self::InvalidToken | Self::ValidationError(_) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "The provided token is invalid",
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "The authentication token has expired",
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An authentication error occurred",
            ),
        };

        counter!(
            "auth_errors_total",
            "error_type" => code.to_string()
        )
        .increment(1);

        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JWT Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Dashboard role as claimed at issue time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Owning entrepreneur for members, the user itself for entrepreneurs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Token ID
    #[serde(default = "generate_jti")]
    pub jti: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

fn generate_jti() -> String {
    Uuid::new_v4().to_string()
}

impl Claims {
    /// Claims for an identity, mirroring its role and tenant.
    pub fn for_identity(identity: &Identity, duration: Duration) -> Self {
        let mut builder = Self::builder(identity.id().as_str())
            .role(identity.role().as_str())
            .expires_in(duration);
        if let Some(tenant) = identity.tenant_id() {
            builder = builder.tenant_id(tenant.as_str());
        }
        builder.build()
    }

    pub fn builder(user_id: impl Into<String>) -> ClaimsBuilder {
        ClaimsBuilder::new(user_id)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// Builder for JWT claims.
pub struct ClaimsBuilder {
    claims: Claims,
}

impl ClaimsBuilder {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            claims: Claims {
                sub: user_id.into(),
                role: None,
                tenant_id: None,
                email: None,
                jti: generate_jti(),
                iat: now.timestamp(),
                exp: (now + Duration::hours(1)).timestamp(),
                iss: None,
                aud: None,
            },
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.claims.role = Some(role.into());
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.claims.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.claims.email = Some(email.into());
        self
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.claims.exp = (Utc::now() + duration).timestamp();
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims.iss = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.claims.aud = Some(audience.into());
        self
    }

    pub fn build(self) -> Claims {
        self.claims
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret
    pub jwt_secret: Option<String>,

    pub jwt_algorithm: Algorithm,

    /// Token issuer for validation
    pub issuer: Option<String>,

    /// Token audience for validation
    pub audience: Option<String>,

    /// Leeway for expiration checks (in seconds)
    pub leeway_secs: u64,

    /// Paths that don't require authentication; a trailing `*` matches a prefix
    pub public_paths: Vec<String>,

    /// Header name for JWT
    pub jwt_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
            leeway_secs: 60,
            public_paths: vec![
                "/health".to_string(),
                "/metrics".to_string(),
                "/api/v1/public/*".to_string(),
            ],
            jwt_header: "Authorization".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }
}

/// Builder for auth configuration.
#[derive(Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    pub fn jwt_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.jwt_algorithm = algorithm;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = Some(audience.into());
        self
    }

    pub fn leeway_secs(mut self, secs: u64) -> Self {
        self.config.leeway_secs = secs;
        self
    }

    pub fn public_paths(mut self, paths: Vec<String>) -> Self {
        self.config.public_paths = paths;
        self
    }

    pub fn add_public_path(mut self, path: impl Into<String>) -> Self {
        self.config.public_paths.push(path.into());
        self
    }

    pub fn build(self) -> AuthConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authentication Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication context attached to requests.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Token subject
    pub subject: String,

    pub role: Option<String>,

    pub tenant_id: Option<String>,

    pub email: Option<String>,

    pub auth_method: AuthMethod,

    pub token_id: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,

    /// Request ID for correlation
    pub request_id: String,
}

/// Authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Jwt,
    Anonymous,
}

impl AuthContext {
    pub fn from_claims(claims: Claims, request_id: String) -> Self {
        let expires_at = claims.expires_at();
        Self {
            subject: claims.sub,
            role: claims.role,
            tenant_id: claims.tenant_id,
            email: claims.email,
            auth_method: AuthMethod::Jwt,
            token_id: Some(claims.jti),
            expires_at: Some(expires_at),
            request_id,
        }
    }

    pub fn anonymous(request_id: String) -> Self {
        Self {
            subject: String::new(),
            role: None,
            tenant_id: None,
            email: None,
            auth_method: AuthMethod::Anonymous,
            token_id: None,
            expires_at: None,
            request_id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_method != AuthMethod::Anonymous
    }

    /// Raw claims for identity resolution.
    pub fn credential(&self) -> Credential {
        Credential {
            subject: self.subject.clone(),
            role: self.role.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates and issues tokens.
pub struct Authenticator {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        if !matches!(
            config.jwt_algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Internal(format!(
                "Unsupported JWT algorithm: {:?}",
                config.jwt_algorithm
            )));
        }

        let secret = config
            .jwt_secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Internal("JWT secret required for HMAC algorithms".into()))?;
        let encoding_key = EncodingKey::from_secret(secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::new(config.jwt_algorithm);
        validation.leeway = config.leeway_secs;

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Check if a path is public (doesn't require auth).
    pub fn is_public_path(&self, path: &str) -> bool {
        self.config.public_paths.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == p,
        })
    }

    /// Authenticate a request from its headers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = self
            .extract_jwt(headers)
            .ok_or(AuthError::MissingCredentials)?;
        self.validate_jwt(&token, request_id(headers))
    }

    fn extract_jwt(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.config.jwt_header)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| {
                s.strip_prefix("Bearer ")
                    .or_else(|| s.strip_prefix("bearer "))
                    .map(|s| s.trim().to_string())
            })
    }

    /// Validate a JWT token.
    pub fn validate_jwt(&self, token: &str, request_id: String) -> Result<AuthContext, AuthError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                debug!("JWT validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidToken
                    | jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidToken,
                    _ => AuthError::ValidationError(e.to_string()),
                }
            })?;

        counter!("auth_success_total", "method" => "jwt").increment(1);

        Ok(AuthContext::from_claims(token_data.claims, request_id))
    }

    /// Sign a token. Issuer and audience default to the configured values.
    pub fn generate_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss = self.config.issuer.clone();
        }
        if claims.aud.is_none() {
            claims.aud = self.config.audience.clone();
        }

        let header = Header::new(self.config.jwt_algorithm);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to generate token: {}", e)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
}

impl AuthLayer {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }

    pub fn from_config(config: AuthConfig) -> Result<Self, AuthError> {
        let authenticator = Authenticator::new(config)?;
        Ok(Self::new(Arc::new(authenticator)))
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if authenticator.is_public_path(request.uri().path()) {
                let context = AuthContext::anonymous(request_id(request.headers()));
                request.extensions_mut().insert(context);
                return inner.call(request).await;
            }

            match authenticator.authenticate(request.headers()) {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                    inner.call(request).await
                }
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            AuthConfig::builder()
                .jwt_secret("super-secret-key-for-testing-only")
                .issuer("bizdash")
                .build(),
        )
        .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_claims_for_identity() {
        let claims = Claims::for_identity(&Identity::collaborator("20", "10"), Duration::hours(1));
        assert_eq!(claims.sub, "20");
        assert_eq!(claims.role.as_deref(), Some("collaborator"));
        assert_eq!(claims.tenant_id.as_deref(), Some("10"));
        assert!(!claims.is_expired());

        let admin = Claims::for_identity(&Identity::super_admin("1"), Duration::hours(1));
        assert!(admin.tenant_id.is_none());
    }

    #[test]
    fn test_token_roundtrip_carries_claims() {
        let auth = authenticator();
        let claims = Claims::builder("10").role("entrepreneur").tenant_id("10").build();
        let token = auth.generate_token(&claims).unwrap();

        let ctx = auth.authenticate(&bearer(&token)).unwrap();
        assert_eq!(ctx.subject, "10");
        assert!(ctx.is_authenticated());
        assert_eq!(
            ctx.credential(),
            Credential {
                subject: "10".into(),
                role: Some("entrepreneur".into()),
                tenant_id: Some("10".into()),
            }
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = authenticator();
        let claims = Claims::builder("10")
            .role("entrepreneur")
            .expires_in(Duration::hours(-2))
            .build();
        let token = auth.generate_token(&claims).unwrap();
        assert!(matches!(
            auth.authenticate(&bearer(&token)),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = Authenticator::new(AuthConfig::builder().jwt_secret("another-secret").build())
            .unwrap();
        let token = other
            .generate_token(&Claims::builder("10").role("entrepreneur").build())
            .unwrap();
        assert!(authenticator().authenticate(&bearer(&token)).is_err());
    }

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            authenticator().authenticate(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_public_paths() {
        let auth = authenticator();
        assert!(auth.is_public_path("/health"));
        assert!(auth.is_public_path("/api/v1/public/price-tables"));
        assert!(!auth.is_public_path("/api/v1/price-tables"));
    }

    #[test]
    fn test_secret_required() {
        assert!(Authenticator::new(AuthConfig::default()).is_err());
    }
}
