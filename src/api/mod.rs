//! Remote API access
//!
//! This module contains everything that talks to the social network:
//! - `ApiClient`: rate-limited, authenticated method calls (the transport)
//! - `scripts`: VKScript templates run through the `execute` method so that
//!   up to 25 sub-calls share one round trip
//! - `SocialApi`: the entity fetchers the crawl coordinator depends on
//! - `VkFetcher`: the `SocialApi` implementation backed by `ApiClient`

mod client;
mod fetcher;
pub mod scripts;
mod traits;

pub use client::{build_http_client, ApiClient};
pub use fetcher::{VkFetcher, PROFILES_PER_CALL};
pub use traits::{BatchResult, SocialApi};

use thiserror::Error;

/// Errors raised by remote API calls
///
/// All of these are hard failures: the crawl does not retry them. Quota
/// exhaustion inside a script is not an error; it surfaces as a
/// [`BatchResult`] whose every entry failed.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("HTTP error calling {method}: {source}")]
    Http {
        method: String,
        source: reqwest::Error,
    },

    #[error("API error {code} calling {method}: {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Unexpected response from {method}: {detail}")]
    UnexpectedResponse { method: String, detail: String },
}

impl ApiError {
    pub(crate) fn unexpected(method: &str, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            method: method.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
