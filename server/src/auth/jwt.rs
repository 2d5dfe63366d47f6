use std::path::Path;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;

use crate::auth::middleware::Claims;
use crate::db::models::Identity;

/// Access token lifetime used by `issue_access_token`.
const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret and shared with the
/// identity service that issues credentials.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token for an identity (HS256).
/// Used by the collaborating identity service and by the test-suite.
pub fn issue_access_token(
    secret: &[u8],
    identity: &Identity,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: identity.id.clone(),
        role: identity.role,
        name: identity.name.clone(),
        email: identity.email.clone(),
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECS,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Validate an access token and return its claims.
/// Every entry point (REST extractor and WebSocket handshake) goes through here.
/// A blank subject is rejected as `InvalidSubject`; callers map `ExpiredSignature`
/// separately when they need to tell expiry apart.
pub fn validate_access_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    if token_data.claims.sub.trim().is_empty() {
        return Err(ErrorKind::InvalidSubject.into());
    }
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;

    fn admin() -> Identity {
        Identity {
            id: "admin-1".into(),
            role: Role::Admin,
            name: "Support".into(),
            email: "support@example.com".into(),
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let secret = [7u8; 32];
        let token = issue_access_token(&secret, &admin()).unwrap();
        let identity = validate_access_token(&secret, &token).unwrap().into_identity();
        assert_eq!(identity, admin());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = issue_access_token(&[1u8; 32], &admin()).unwrap();
        let err = validate_access_token(&[2u8; 32], &token).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::InvalidSignature);
    }

    #[test]
    fn test_blank_subject_is_rejected() {
        let secret = [5u8; 32];
        let blank = Identity {
            id: "  ".into(),
            ..admin()
        };
        let token = issue_access_token(&secret, &blank).unwrap();
        let err = validate_access_token(&secret, &token).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::InvalidSubject);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let secret = [3u8; 32];
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "u1".into(),
            role: Role::User,
            name: "U".into(),
            email: "u@example.com".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(&secret)).unwrap();
        let err = validate_access_token(&secret, &token).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::ExpiredSignature);
    }

    #[test]
    fn test_secret_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let first = load_or_generate_jwt_secret(data_dir).unwrap();
        let second = load_or_generate_jwt_secret(data_dir).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
    }
}
