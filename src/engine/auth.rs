//! Authentication against the remote compute service
//!
//! Authentication yields an explicit [`AuthResult`]. The remote engine can
//! only be built from an [`AuthSession`], so a failed login surfaces as
//! [`YieldError::NotAuthenticated`] at the first call that needs the service
//! instead of as an opaque downstream failure.

use crate::config::ServiceConfig;
use crate::io::credentials::ServiceAccountCredentials;
use crate::types::{YieldError, YieldResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token obtained for one project
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub project_id: String,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |t| now >= t)
    }
}

/// Outcome of [`authenticate`]
#[derive(Debug, Clone)]
pub enum AuthResult {
    Ok(AuthSession),
    Failed(String),
}

impl AuthResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, AuthResult::Ok(_))
    }

    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthResult::Ok(session) => Some(session),
            AuthResult::Failed(_) => None,
        }
    }

    pub fn into_session(self) -> YieldResult<AuthSession> {
        match self {
            AuthResult::Ok(session) => Ok(session),
            AuthResult::Failed(reason) => Err(YieldError::NotAuthenticated(reason)),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_email: &'a str,
    private_key: &'a str,
    project_id: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchange service-account credentials for a session token
pub fn authenticate(service: &ServiceConfig, credentials: &ServiceAccountCredentials) -> AuthResult {
    let client = reqwest::blocking::Client::builder()
        .timeout(service.timeout_secs.map(std::time::Duration::from_secs))
        .build();
    match client {
        Ok(client) => authenticate_with(&client, service, credentials),
        Err(e) => {
            log::error!("Compute service initialization failed: {}", e);
            AuthResult::Failed(e.to_string())
        }
    }
}

/// [`authenticate`] over a caller-supplied HTTP client
pub fn authenticate_with(
    client: &reqwest::blocking::Client,
    service: &ServiceConfig,
    credentials: &ServiceAccountCredentials,
) -> AuthResult {
    match request_token(client, service, credentials) {
        Ok(session) => {
            log::info!("Compute service initialized for project {}", session.project_id);
            AuthResult::Ok(session)
        }
        Err(e) => {
            log::error!("Compute service initialization failed: {}", e);
            AuthResult::Failed(e.to_string())
        }
    }
}

fn request_token(
    client: &reqwest::blocking::Client,
    service: &ServiceConfig,
    credentials: &ServiceAccountCredentials,
) -> YieldResult<AuthSession> {
    let url = format!("{}/v1/auth/token", service.base_url.trim_end_matches('/'));
    log::debug!("Requesting access token from {}", url);

    let response = client
        .post(&url)
        .json(&TokenRequest {
            client_email: &credentials.client_email,
            private_key: &credentials.private_key,
            project_id: &credentials.project_id,
        })
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(YieldError::Remote {
            status: status.as_u16(),
            message: response.text().unwrap_or_default(),
        });
    }

    let token: TokenResponse = response.json()?;
    Ok(AuthSession {
        project_id: credentials.project_id.clone(),
        access_token: token.access_token,
        expires_at: token.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
    })
}
