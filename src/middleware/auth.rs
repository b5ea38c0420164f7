//! Bearer-token identity for the HTTP surface.
//!
//! Access tokens are HS256 JWTs minted by the identity provider; `sub` is the
//! user's id. Roles are not trusted from the token and are read from the
//! identity directory on each request that needs one.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserRole;
use crate::state::AppState;
use crate::utils::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
}

pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthKeys {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        // provider tokens carry an audience we do not pin
        validation.validate_aud = false;

        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::AuthError(format!("Invalid token: {e}")))
    }

    /// Mints a token the way the identity provider does. Used by tests and
    /// local tooling.
    pub fn issue(&self, user_id: Uuid, email: Option<&str>, ttl: Duration) -> Result<String, AppError> {
        let claims = Claims {
            sub: user_id,
            email: email.map(str::to_string),
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {e}")))
    }
}

/// A caller with a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// A caller whose role allows door scanning and staff operations.
#[derive(Debug, Clone)]
pub struct StaffUser {
    pub user: AuthUser,
    pub role: UserRole,
}

/// A caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user: AuthUser,
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::AuthError("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::AuthError("Invalid Authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::AuthError("Invalid Authorization format (expected: Bearer <token>)".to_string())
        })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = state.auth_keys.verify(bearer_token(parts)?)?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let role = state.directory.user_role(user.id).await?;

        if !role.can_scan() {
            return Err(AppError::Forbidden("Staff access required".to_string()));
        }

        Ok(StaffUser { user, role })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if state.directory.user_role(user.id).await? != UserRole::Admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminUser { user })
    }
}
