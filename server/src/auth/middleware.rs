use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};

use crate::db::models::{Identity, Role};
use crate::error::ChatError;

/// JWT claims extracted from Authorization: Bearer header.
/// Implements axum's FromRequestParts for use as an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    pub role: Role,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.sub,
            role: self.role,
            name: self.name,
            email: self.email,
        }
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ChatError::Authentication("missing bearer token".to_string()))?;

        // JWT secret is placed in request extensions by the router middleware
        let jwt_secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| ChatError::Persistence("JWT secret not configured".to_string()))?;

        crate::auth::jwt::validate_access_token(&jwt_secret.0, token)
            .map_err(|e| ChatError::Authentication(e.to_string()))
    }
}

/// Claims of a caller that must hold the admin role.
#[derive(Debug, Clone)]
pub struct AdminClaims(pub Claims);

impl<S> FromRequestParts<S> for AdminClaims
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = Claims::from_request_parts(parts, state).await?;
        if claims.role != Role::Admin {
            return Err(ChatError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminClaims(claims))
    }
}

/// JWT secret stored in request extensions for the Claims extractor
#[derive(Clone)]
pub struct JwtSecret(pub Vec<u8>);
