//! HTTP implementation of [`DeviceApi`] against the Packet REST API.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, trace};

use super::types::{Device, DeviceCreateRequest, DevicePage, ErrorBody};
use super::{ApiFuture, DeviceApi};
use crate::cloud::{CloudSpec, CloudSpecError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: u32 = 100;

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Errors raised by the HTTP layer.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The API rejected the token.
    #[error("authentication rejected ({status}): {message}")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
        /// API message.
        message: String,
    },
    /// The target resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Any other non-success response.
    #[error("API returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// API message.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Authenticated handle on the Packet API.
#[derive(Clone)]
pub struct PacketApi {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    consumer_token: Option<String>,
}

impl fmt::Debug for PacketApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketApi")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl PacketApi {
    /// Creates a handle for `endpoint` authenticated with `api_token`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            api_token: api_token.into(),
            consumer_token: None,
        }
    }

    /// Creates a handle from a validated cloud spec.
    ///
    /// # Errors
    ///
    /// Returns [`CloudSpecError`] when the spec carries no usable credential.
    pub fn from_cloud_spec(spec: &CloudSpec) -> Result<Self, CloudSpecError> {
        let credentials = spec.api_credentials()?;
        Ok(Self::new(&spec.endpoint, credentials.api_token))
    }

    /// Sets the consumer token sent with every request.
    #[must_use]
    pub fn with_consumer_token(mut self, token: Option<String>) -> Self {
        self.consumer_token = token.filter(|value| !value.trim().is_empty());
        self
    }

    /// Returns the consumer token sent with every request, if any.
    #[must_use]
    pub fn consumer_token(&self) -> Option<&str> {
        self.consumer_token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.endpoint);
        trace!(%method, %url, "packet api request");
        let builder = self
            .client
            .request(method, url)
            .header("X-Auth-Token", &self.api_token)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.consumer_token {
            Some(token) => builder.header("X-Consumer-Token", token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder, target: &str) -> Result<Response, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Err(status_error(status, target, error_message(&body)))
    }

    async fn send_json<T: DeserializeOwned>(
        builder: RequestBuilder,
        target: &str,
    ) -> Result<T, ApiError> {
        let response = Self::send(builder, target).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn list_all_devices(&self, project_id: &str) -> Result<Vec<Device>, ApiError> {
        let path = format!("/projects/{project_id}/devices");
        let target = path.as_str();
        let devices = collect_pages(move |page_number| {
            let builder = self
                .request(Method::GET, target)
                .query(&[("page", page_number), ("per_page", PER_PAGE)]);
            Self::send_json::<DevicePage>(builder, target)
        })
        .await?;
        debug!(project = project_id, count = devices.len(), "listed devices");
        Ok(devices)
    }
}

/// Fetches pages from 1 until one reports no successor.
///
/// A failed page fails the whole listing.
async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<Device>, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<DevicePage, ApiError>>,
{
    let mut devices = Vec::new();
    let mut page_number: u32 = 1;
    loop {
        let page = fetch_page(page_number).await?;
        let has_next = page.has_next();
        devices.extend(page.devices);
        if !has_next {
            return Ok(devices);
        }
        page_number = page_number.saturating_add(1);
    }
}

fn status_error(status: StatusCode, target: &str, message: String) -> ApiError {
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(target.to_owned()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        other => ApiError::Status {
            status: other.as_u16(),
            message,
        },
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

impl DeviceApi for PacketApi {
    fn list_devices<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, Vec<Device>> {
        Box::pin(self.list_all_devices(project_id))
    }

    fn create_device<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a DeviceCreateRequest,
    ) -> ApiFuture<'a, Device> {
        Box::pin(async move {
            let path = format!("/projects/{project_id}/devices");
            let builder = self.request(Method::POST, &path).json(request);
            Self::send_json(builder, &path).await
        })
    }

    fn delete_device<'a>(&'a self, device_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let path = format!("/devices/{device_id}");
            Self::send(self.request(Method::DELETE, &path), device_id).await?;
            Ok(())
        })
    }
}
