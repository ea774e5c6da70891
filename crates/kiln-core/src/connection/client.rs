//! HTTP access to a runtime instance's REST API.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use thiserror::Error;
use url::Url;

use super::Application;

const ENVIRONMENT_PATH: &str = "api/v1/environment";
const PROJECTS_PATH: &str = "api/v1/projects";

/// Errors raised while talking to the runtime API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid API endpoint {path:?} against {base}: {source}")]
    Endpoint {
        base: Url,
        path: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned {status}")]
    Status { url: Url, status: StatusCode },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// Client-side view of a runtime's REST API.
///
/// The base URL is an argument rather than construction state so one client
/// can serve every registered connection.
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeClient: Send + Sync {
    /// Confirms the API at `base` answers at all.
    fn ping(&self, base: &Url) -> Result<(), ClientError>;

    /// Lists the workloads hosted by the runtime at `base`.
    fn applications(&self, base: &Url) -> Result<Vec<Application>, ClientError>;
}

/// Blocking HTTP implementation of [`RuntimeClient`].
pub struct HttpRuntimeClient {
    client: Client,
}

impl HttpRuntimeClient {
    /// Builds a client applying `timeout` to every request.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ClientError::Build { source })?;
        Ok(Self { client })
    }

    fn get(&self, base: &Url, path: &'static str) -> Result<Response, ClientError> {
        let url = base.join(path).map_err(|source| ClientError::Endpoint {
            base: base.clone(),
            path,
            source,
        })?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|source| ClientError::Request {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                url,
                status: response.status(),
            });
        }
        Ok(response)
    }
}

impl RuntimeClient for HttpRuntimeClient {
    fn ping(&self, base: &Url) -> Result<(), ClientError> {
        self.get(base, ENVIRONMENT_PATH).map(drop)
    }

    fn applications(&self, base: &Url) -> Result<Vec<Application>, ClientError> {
        let response = self.get(base, PROJECTS_PATH)?;
        let url = response.url().clone();
        response
            .json()
            .map_err(|source| ClientError::Decode { url, source })
    }
}
