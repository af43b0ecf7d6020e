use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::UserId;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject - the opaque user id
    pub exp: i64,    // expiration time (unix timestamp)
}

/// HS256 keys derived from the shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate signature and expiry, then parse `sub` as a user id.
    pub fn verify(&self, token: &str) -> Result<UserId, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected token");
                AppError::Unauthorized
            })?;
        UserId::parse(&data.claims.sub).map_err(|_| AppError::Unauthorized)
    }

    /// Mint a token for `user`, valid for `ttl_secs`. Used by local tooling
    /// and tests; production tokens come from the identity service.
    pub fn issue(&self, user: &UserId, ttl_secs: i64) -> Result<String, AppError> {
        let claims = Claims {
            sub: user.to_string(),
            exp: Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            AppError::Internal
        })
    }
}

/// Authenticated caller, placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware to extract the bearer JWT and add the caller to extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AppError::Unauthorized)?;
    let user = state.jwt.verify(token)?;
    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}
