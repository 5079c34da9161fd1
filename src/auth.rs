use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::AppConfig,
    error::ApiError,
    models::User,
    repository::RepositoryState,
};

/// Lifetime of an issued token.
pub const TOKEN_TTL_SECS: i64 = 60 * 60;

/// Claims
///
/// The token payload. `email` identifies the caller; whatever else the client sent at
/// issuance is carried along untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub email: String,
    /// Issued At: seconds since the epoch.
    pub iat: i64,
    /// Expiration Time: tokens are rejected once this has passed.
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Builds claims from an arbitrary client payload. The payload must carry a
    /// non-empty `email` string; any `iat`/`exp` it contains is replaced.
    pub fn from_payload(mut payload: Map<String, Value>) -> Result<Self, ApiError> {
        let email = match payload.remove("email") {
            Some(Value::String(email)) if !email.trim().is_empty() => email,
            _ => return Err(ApiError::Validation("email is required".to_string())),
        };
        payload.remove("iat");
        payload.remove("exp");

        let now = Utc::now().timestamp();
        Ok(Self {
            email,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            extra: payload,
        })
    }
}

/// issue_token
///
/// Signs the payload's claims with HS256. The token expires one hour after issuance.
pub fn issue_token(payload: Map<String, Value>, secret: &str) -> Result<String, ApiError> {
    let claims = Claims::from_payload(payload)?;
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}

/// verify_token
///
/// Checks signature and expiry. Every failure collapses to `Unauthorized`; the detail
/// only goes to the debug log.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("token rejected: {:?}", e.kind());
            ApiError::Unauthorized
        })
}

/// Extracts the credential from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// AuthUser
///
/// The verified caller. Usable as a handler argument on any route; when the
/// authentication middleware already ran, the claims it attached to the request are
/// reused instead of decoding the token a second time.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    pub fn email(&self) -> &str {
        &self.claims.email
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(AuthUser {
                claims: claims.clone(),
            });
        }

        let config = AppConfig::from_ref(state);
        let token = bearer_token(&parts.headers)?;
        let claims = verify_token(token, &config.token_secret)?;
        Ok(AuthUser { claims })
    }
}

/// AdminUser
///
/// A verified caller whose stored user record has `role == "admin"`. The role is
/// read from storage once per request (the admin middleware caches the result in the
/// request extensions), so a revoked role takes effect even for unexpired tokens.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub claims: Claims,
    pub user: User,
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(admin) = parts.extensions.get::<AdminUser>() {
            return Ok(admin.clone());
        }

        let AuthUser { claims } = AuthUser::from_request_parts(parts, state).await?;

        let repo = RepositoryState::from_ref(state);
        match repo.find_user_by_email(&claims.email).await? {
            Some(user) if user.is_admin() => Ok(AdminUser { claims, user }),
            _ => {
                tracing::debug!(email = %claims.email, "admin access denied");
                Err(ApiError::Forbidden)
            }
        }
    }
}
