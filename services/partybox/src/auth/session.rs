//! Administrator sessions as signed bearer tokens.
//!
//! # Purpose
//! Checks the configured administrator credentials and mints HS256 JWTs that
//! stand in for a logged-in session. Verification pins the algorithm, issuer,
//! and audience, and requires the `admin` role claim.
//!
//! # Security notes
//! - The signing secret and password come from config and are never logged.
//! - Tokens are stateless; ending a session means discarding the token.
use crate::config::AdminConfig;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const ISSUER: &str = "partybox";
const AUDIENCE: &str = "partybox-admin";
const ADMIN_ROLE: &str = "admin";
const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("session is not an administrator session")]
    NotAdmin,
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// A freshly minted session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct SessionIssuer {
    username: String,
    password: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(admin: &AdminConfig) -> Self {
        let secret = admin.session_secret.as_bytes();
        Self {
            username: admin.username.clone(),
            password: admin.password.clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::from_secs(admin.session_ttl_secs),
        }
    }

    /// Check credentials and mint a session for the administrator.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedSession, SessionError> {
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        if !(user_ok && pass_ok) {
            return Err(SessionError::InvalidCredentials);
        }
        self.mint(username)
    }

    fn mint(&self, subject: &str) -> Result<IssuedSession, SessionError> {
        let now = now_epoch_seconds();
        let exp = now + self.ttl.as_secs() as i64;
        let claims = SessionClaims {
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            sub: subject.to_string(),
            role: ADMIN_ROLE.to_string(),
            iat: now,
            exp,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedSession {
            token,
            expires_at: exp,
        })
    }

    /// Validate a bearer token and return its claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = LEEWAY_SECS;
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        if data.claims.role != ADMIN_ROLE {
            return Err(SessionError::NotAdmin);
        }
        Ok(data.claims)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
