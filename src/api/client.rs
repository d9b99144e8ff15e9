//! Rate-limited API transport
//!
//! Every call is a form-encoded POST to `{base_url}/{method}` carrying the API
//! version and access token. After each call the client sleeps for whatever
//! is left of the configured request interval, so consecutive calls never run
//! faster than the global rate ceiling.

use crate::api::{ApiError, ApiResult};
use crate::config::ApiConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Builds an HTTP client with the crawler's user agent and timeouts
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Authenticated, rate-limited method caller
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    access_token: String,
    version: String,
    min_interval: Duration,
}

impl ApiClient {
    /// Creates a client using the crawl access token
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        Self::with_token(config, &config.access_token)
    }

    /// Creates a client that shares the endpoint settings of `config` but
    /// authenticates with another token (used by the alert sink)
    pub fn with_token(config: &ApiConfig, access_token: &str) -> ApiResult<Self> {
        Ok(Self {
            http: build_http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            version: config.version.clone(),
            min_interval: Duration::from_millis(config.request_interval),
        })
    }

    /// Minimum spacing enforced between consecutive calls
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Calls an API method and returns its `response` payload
    ///
    /// # Errors
    ///
    /// * `ApiError::Http` - the request failed or the body was not JSON
    /// * `ApiError::Remote` - the API answered with an `error` object
    /// * `ApiError::UnexpectedResponse` - neither `response` nor `error` present
    pub async fn call(&self, method: &str, params: &[(&str, String)]) -> ApiResult<Value> {
        let started = Instant::now();
        let result = self.send(method, params).await;

        // Top up to the rate ceiling, whether or not the call succeeded
        let elapsed = started.elapsed();
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }

        let mut body = result?;

        if let Some(error) = body.get("error") {
            return Err(ApiError::Remote {
                method: method.to_string(),
                code: error.get("error_code").and_then(Value::as_i64).unwrap_or(-1),
                message: error
                    .get("error_msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        match body.get_mut("response") {
            Some(response) => Ok(response.take()),
            None => Err(ApiError::unexpected(method, "missing 'response' field")),
        }
    }

    async fn send(&self, method: &str, params: &[(&str, String)]) -> ApiResult<Value> {
        let url = format!("{}/{}", self.base_url, method);

        let mut form: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push(("v", self.version.as_str()));
        form.push(("access_token", self.access_token.as_str()));

        tracing::trace!("Calling {}", method);

        let http_error = |source: reqwest::Error| ApiError::Http {
            method: method.to_string(),
            source,
        };

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(http_error)?;

        response.json::<Value>().await.map_err(http_error)
    }

    /// Runs a VKScript program through the `execute` method
    pub async fn execute(&self, code: &str) -> ApiResult<Value> {
        self.call("execute", &[("code", code.to_string())]).await
    }

    /// Returns the number of members in a group
    pub async fn group_members_count(&self, group_id: u64) -> ApiResult<u64> {
        let response = self
            .call("groups.getMembers", &[("group_id", group_id.to_string())])
            .await?;

        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ApiError::unexpected("groups.getMembers", "missing member count"))
    }

    /// Fetches raw user records with the requested profile fields
    pub async fn users_get(&self, user_ids: &[u64], fields: &[&str]) -> ApiResult<Vec<Value>> {
        let ids = user_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .call(
                "users.get",
                &[("user_ids", ids), ("fields", fields.join(","))],
            )
            .await?;

        match response {
            Value::Array(users) => Ok(users),
            _ => Err(ApiError::unexpected("users.get", "expected an array of users")),
        }
    }

    /// Sends a private message to a user
    pub async fn messages_send(&self, user_id: u64, message: &str) -> ApiResult<()> {
        let random_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        self.call(
            "messages.send",
            &[
                ("user_id", user_id.to_string()),
                ("message", message.to_string()),
                ("random_id", random_id.to_string()),
            ],
        )
        .await?;

        Ok(())
    }
}
