//! Shared-password access gate.
//!
//! The shop has one credential held server-side. Logging in with it yields an
//! opaque, expiring bearer token; every product route checks that token.

use crate::errors::ServiceError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Issues and checks session tokens. Tokens are kept only as SHA-256 digests.
#[derive(Debug)]
pub struct SessionGate {
    password_digest: Option<[u8; 32]>,
    ttl: Duration,
    sessions: DashMap<String, DateTime<Utc>>,
}

impl SessionGate {
    /// A gate that lets every request through.
    pub fn open() -> Self {
        Self {
            password_digest: None,
            ttl: Duration::zero(),
            sessions: DashMap::new(),
        }
    }

    pub fn new(password: Option<&str>, ttl_secs: u64) -> Self {
        let ttl_secs = ttl_secs.min(MAX_SESSION_TTL_SECS) as i64;
        Self {
            password_digest: password.map(digest),
            ttl: Duration::seconds(ttl_secs),
            sessions: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password_digest.is_some()
    }

    /// Exchanges the shared password for a session token.
    pub fn login(&self, password: &str) -> Result<SessionToken, ServiceError> {
        let expected = self.password_digest.as_ref().ok_or_else(|| {
            ServiceError::InvalidInput("Access control is not configured".to_string())
        })?;
        if !constant_time_eq(expected, &digest(password)) {
            return Err(ServiceError::Unauthorized("Invalid password".to_string()));
        }

        self.purge_expired();

        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let expires_at = Utc::now() + self.ttl;
        self.sessions.insert(hex::encode(digest(&token)), expires_at);
        info!(active_sessions = self.sessions.len(), "session opened");

        Ok(SessionToken {
            token,
            token_type: "Bearer".to_string(),
            expires_at,
        })
    }

    pub fn logout(&self, token: &str) {
        self.sessions.remove(&hex::encode(digest(token)));
    }

    /// Whether `token` names a live session. Expired sessions are dropped.
    pub fn verify(&self, token: &str) -> bool {
        let key = hex::encode(digest(token));
        let expires_at = match self.sessions.get(&key) {
            Some(entry) => *entry,
            None => return false,
        };
        if expires_at > Utc::now() {
            true
        } else {
            self.sessions.remove(&key);
            false
        }
    }

    fn purge_expired(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, expires_at| *expires_at > now);
    }
}

/// Pulls the bearer token out of an `Authorization` header value.
pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rejects requests without a live session when the gate is enabled.
pub async fn session_middleware(
    State(gate): State<Arc<SessionGate>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if gate.is_enabled() {
        let authorized = bearer_token(&request).map(|t| gate.verify(t)).unwrap_or(false);
        if !authorized {
            debug!(uri = %request.uri(), "rejecting request without a live session");
            return Err(ServiceError::Unauthorized(
                "A valid session token is required".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}
