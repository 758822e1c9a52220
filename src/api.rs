use futures_util::future::BoxFuture;
use log::{debug, warn};
use reqwest::{header, Client, Method};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{ApiError, ListingError};
use crate::listing::{ListingApi, ListingRequest, LmsItem};

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// One backend call. A request with `data` is sent as a JSON `POST`,
/// otherwise as a `GET`.
#[derive(Debug, Clone, Copy)]
pub struct ApiRequest<'a> {
    pub auth_token: &'a str,
    pub path: &'a str,
    pub params: &'a [(String, String)],
    pub data: Option<&'a Value>,
}

impl<'a> ApiRequest<'a> {
    pub fn get(auth_token: &'a str, path: &'a str) -> Self {
        Self {
            auth_token,
            path,
            params: &[],
            data: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` (relative, absolute or a full URL) and append `params`.
    pub fn resolve(&self, path: &str, params: &[(String, String)]) -> Result<Url, ListingError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| ListingError::Transport(format!("Invalid API path {path}: {err}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Make a call and return the decoded JSON body.
    ///
    /// Non-2xx responses become [`ApiError`]s built from the error body. A
    /// failure to reach the server or to decode its reply is a transport error.
    pub async fn call(&self, request: ApiRequest<'_>) -> Result<Value, ListingError> {
        let url = self.resolve(request.path, request.params)?;
        let method = if request.data.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        debug!("[picker:api] {method} {url}");

        let mut builder = self
            .client
            .request(method, url.clone())
            .header(header::AUTHORIZATION, request.auth_token);
        if let Some(data) = request.data {
            let body = serde_json::to_vec(data).map_err(|err| ListingError::Transport(err.to_string()))?;
            builder = builder
                .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();

        if status.is_success() {
            return Ok(resp.json::<Value>().await?);
        }

        let body = resp.json::<ErrorBody>().await?;
        warn!(
            "[picker:api] {url} failed with {status}: {}",
            body.message.as_deref().unwrap_or("<no message>")
        );
        Err(ListingError::Api(ApiError {
            status: Some(status.as_u16()),
            error_message: body.message,
            error_code: body.error_code,
            details: body.details,
        }))
    }
}

impl ListingApi for ApiClient {
    fn list_files<'a>(
        &'a self,
        request: &'a ListingRequest,
    ) -> BoxFuture<'a, Result<Vec<LmsItem>, ListingError>> {
        Box::pin(async move {
            let value = self
                .call(ApiRequest {
                    auth_token: &request.auth_token,
                    path: &request.path,
                    params: &request.params,
                    data: None,
                })
                .await?;
            serde_json::from_value(value)
                .map_err(|err| ListingError::Transport(format!("Unexpected listing response: {err}")))
        })
    }
}
