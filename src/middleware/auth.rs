//! Authentication extractors
//!
//! Session issuance lives in the identity service; this module only verifies
//! access tokens and surfaces the acting user. Handlers pass the extracted
//! user into core operations, which check the role themselves.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserRole;

/// Verification-side auth configuration shared via app state
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Claims carried in marketplace access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Role name, e.g. "FINANCE_ADMIN"
    pub role: String,
    /// Account email (used by anti-fraud checks)
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Authenticated user extracted from a bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub email: Option<String>,
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthError {
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: String,
    message: String,
}

impl AuthError {
    fn new(code: &str, message: &str) -> Self {
        Self {
            error: AuthErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthError::new(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                    .into_response()
                })?;

        let auth_config = AuthConfig::from_ref(state);

        let claims = decode::<Claims>(
            bearer.token(),
            &DecodingKey::from_secret(auth_config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            let (code, message) = match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ("TOKEN_EXPIRED", "Token has expired")
                }
                _ => ("INVALID_TOKEN", "Invalid token"),
            };
            AuthError::new(code, message).into_response()
        })?
        .claims;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            AuthError::new("INVALID_TOKEN", "Invalid user ID in token").into_response()
        })?;

        let role = UserRole::parse(&claims.role).ok_or_else(|| {
            AuthError::new("INVALID_TOKEN", "Invalid role in token").into_response()
        })?;

        Ok(AuthenticatedUser {
            user_id,
            role,
            email: claims.email,
        })
    }
}

/// Extractor requiring the ADMIN role
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !matches!(user.role, UserRole::Admin) {
            return Err((
                StatusCode::FORBIDDEN,
                Json(AuthError::new("FORBIDDEN", "Admin access required")),
            )
                .into_response());
        }

        Ok(AdminUser(user))
    }
}
