use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Account, Identity, PermissionModel};

/// Session token claims. `role` stays a string on the wire so that an
/// unknown tag surfaces as an authentication failure, not a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("invalid Authorization header format")]
    MalformedHeader,

    #[error("invalid token")]
    InvalidToken,

    #[error("invalid user id")]
    InvalidSubject,

    #[error("invalid role")]
    InvalidRole,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::unauthorized(err.to_string())
    }
}

/// HS256 session-token codec.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    permissions: Arc<PermissionModel>,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig, permissions: Arc<PermissionModel>) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }
        if config.token_ttl_hours <= 0 {
            anyhow::bail!("JWT token lifetime must be positive");
        }

        tracing::info!("Token codec initialized with HS256 secret");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            token_ttl: Duration::hours(config.token_ttl_hours),
            permissions,
        })
    }

    pub fn permissions(&self) -> &PermissionModel {
        &self.permissions
    }

    /// Sign a session token for `account`.
    pub fn issue(&self, account: &Account) -> Result<IssuedToken, anyhow::Error> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        let claims = SessionClaims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature and expiry, then resolve the role into permissions.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                AuthError::InvalidToken
            })?
            .claims;

        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidSubject)?;
        let (role, permissions) = self
            .permissions
            .resolve(&claims.role)
            .ok_or(AuthError::InvalidRole)?;

        Ok(Identity {
            subject_id,
            name: claims.name,
            email: claims.email,
            role,
            permissions,
            issued_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(AuthError::InvalidToken)
}
