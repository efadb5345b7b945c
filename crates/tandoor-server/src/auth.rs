//! Bearer token issuance and checking.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;
use crate::routes::{ApiError, AppState};

const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

/// Issues opaque tokens to the single configured user and remembers them
/// until they expire.
pub struct TokenStore {
    username: String,
    password: String,
    ttl: Duration,
    issued: Mutex<HashMap<String, Instant>>,
}

impl TokenStore {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_ttl(username, password, TOKEN_TTL)
    }

    pub fn with_ttl(username: impl Into<String>, password: impl Into<String>, ttl: Duration) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ttl,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// A fresh token if the credentials match, `None` otherwise.
    pub fn issue(&self, credentials: &Credentials) -> Option<Token> {
        if credentials.username != self.username || credentials.password != self.password {
            return None;
        }
        let token = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut issued = self.tokens();
        issued.retain(|_, expires| *expires > now);
        issued.insert(token.clone(), now + self.ttl);
        tracing::debug!(user = %self.username, "issued access token");
        Some(Token {
            access_token: token,
            token_type: "bearer".to_string(),
        })
    }

    pub fn is_valid(&self, token: &str) -> bool {
        let now = Instant::now();
        self.tokens().get(token).is_some_and(|expires| *expires > now)
    }

    /// The issued tokens. A panic while the map was held leaves every entry
    /// intact, so a poisoned lock is recovered rather than failing logins.
    fn tokens(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.issued.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!("token store lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

/// Rejects requests that do not carry a live bearer token.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if state.auth.is_valid(token) => Ok(next.run(request).await),
        _ => Err(ApiError::unauthorized("could not validate credentials")),
    }
}
