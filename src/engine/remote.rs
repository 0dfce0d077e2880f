use super::auth::{AuthResult, AuthSession};
use super::expr::{ReduceRegionsRequest, ReduceRegionsResponse};
use super::GeoEngine;
use crate::config::ServiceConfig;
use crate::types::{YieldError, YieldResult};

/// Blocking client for the hosted compute service.
///
/// Each call is one synchronous round-trip. Failures propagate to the caller
/// unchanged; nothing is retried.
pub struct RemoteEngine {
    client: reqwest::blocking::Client,
    base_url: String,
    session: AuthSession,
}

impl RemoteEngine {
    pub fn new(session: AuthSession, service: &ServiceConfig) -> YieldResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(service.timeout_secs.map(std::time::Duration::from_secs))
            .build()?;
        Ok(Self::with_client(client, session, service))
    }

    /// Use a preconfigured HTTP client (proxy, TLS roots); its own timeout
    /// applies and `service.timeout_secs` is ignored
    pub fn with_client(
        client: reqwest::blocking::Client,
        session: AuthSession,
        service: &ServiceConfig,
    ) -> Self {
        Self {
            client,
            base_url: service.base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    /// Build from an authentication outcome; a failed login is reported here
    pub fn from_auth(auth: AuthResult, service: &ServiceConfig) -> YieldResult<Self> {
        Self::new(auth.into_session()?, service)
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn reduce_regions_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/image:reduceRegions",
            self.base_url, self.session.project_id
        )
    }
}

impl GeoEngine for RemoteEngine {
    fn reduce_regions(&self, request: &ReduceRegionsRequest) -> YieldResult<ReduceRegionsResponse> {
        if self.session.is_expired(chrono::Utc::now()) {
            return Err(YieldError::NotAuthenticated("session token expired".to_string()));
        }

        let url = self.reduce_regions_url();
        log::debug!(
            "POST {} ({} geometries, scale {} m)",
            url,
            request.geometries.len(),
            request.scale
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.session.access_token)
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(YieldError::Remote {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let body: ReduceRegionsResponse = response.json()?;
        if body.features.len() != request.geometries.len() {
            return Err(YieldError::InvalidFormat(format!(
                "Service returned {} features for {} geometries",
                body.features.len(),
                request.geometries.len()
            )));
        }
        Ok(body)
    }
}
