//! HTTP client for the annotator service contract
//!
//! Shared by every driver whose instances end up behind a base URL.

use crate::documentation::{InputOutput, ServiceDocumentation};
use crate::driver::{WireRequest, WireResponse};
use crate::error::DriverError;
use std::time::Duration;

/// Path of the processing endpoint
pub const PROCESS_PATH: &str = "/v1/process";
/// Path of the documentation endpoint
pub const DOCUMENTATION_PATH: &str = "/v1/documentation";
/// Path of the input/output description endpoint
pub const INPUT_OUTPUT_PATH: &str = "/v1/details/input_output";

/// Client for `/v1/*` annotator endpoints
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    check_timeout: Duration,
}

impl ServiceClient {
    /// Create client with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Wrap a preconfigured `reqwest` client
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            check_timeout: Duration::from_secs(5),
        }
    }

    /// Timeout for documentation and readiness checks
    #[inline]
    #[must_use]
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// POST an encoded snapshot to `{base}/v1/process`
    ///
    /// # Errors
    /// Connection failures and non-2xx replies become `StageUnreachable`
    pub async fn process(
        &self,
        base: &str,
        request: &WireRequest,
    ) -> Result<WireResponse, DriverError> {
        let url = join(base, PROCESS_PATH);
        tracing::debug!(%url, bytes = request.body.len(), "posting snapshot");

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .header(reqwest::header::ACCEPT, request.content_type)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| DriverError::unreachable(base, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DriverError::unreachable(
                base,
                format!("status {status}: {text}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DriverError::unreachable(base, e))?;

        Ok(WireResponse {
            body: body.to_vec(),
        })
    }

    /// GET `{base}/v1/documentation`
    ///
    /// # Errors
    /// Returns `EndpointUnreachable` if the service does not answer with
    /// decodable documentation
    pub async fn documentation(&self, base: &str) -> Result<ServiceDocumentation, DriverError> {
        self.get_json(base, DOCUMENTATION_PATH).await
    }

    /// Check that something answers HTTP at `base`
    ///
    /// Any status counts; the body is not decoded.
    ///
    /// # Errors
    /// Returns `EndpointUnreachable` if no response arrives
    pub async fn ping(&self, base: &str) -> Result<(), DriverError> {
        self.http
            .get(join(base, DOCUMENTATION_PATH))
            .timeout(self.check_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DriverError::verification(base, e))
    }

    /// GET `{base}/v1/details/input_output`
    ///
    /// # Errors
    /// Returns `EndpointUnreachable` on failure
    pub async fn input_output(&self, base: &str) -> Result<InputOutput, DriverError> {
        self.get_json(base, INPUT_OUTPUT_PATH).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
    ) -> Result<T, DriverError> {
        let url = join(base, path);
        let response = self
            .http
            .get(&url)
            .timeout(self.check_timeout)
            .send()
            .await
            .map_err(|e| DriverError::verification(base, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::verification(base, format!("{path} returned {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DriverError::verification(base, format!("{path} schema mismatch: {e}")))
    }
}

impl Default for ServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
