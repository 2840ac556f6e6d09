//! Kaya client interface
//!
//! The orchestrator talks to Kaya only through [`KayaClient`], so tests can substitute an
//! in-memory implementation for the HTTP one.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{Ascent, Climb, ClimbCategory, Location};

/// Errors returned by a Kaya client, classified by how callers should react.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP 429; `retry_after` is the `Retry-After` hint in seconds when present
    #[error("rate limited by Kaya{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    /// HTTP 401 or 403
    #[error("Kaya rejected the request credentials (status {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success status
    #[error("Kaya request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Undecodable body or a GraphQL `errors` array
    #[error("malformed Kaya response: {0}")]
    MalformedResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid Kaya URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Unauthorized { .. } | Self::MalformedResponse(_) | Self::Url(_) => false,
        }
    }
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

/// Read access to the Kaya platform.
///
/// Paged calls return fewer than `count` items (possibly none) on the last page.
#[async_trait]
pub trait KayaClient: Send + Sync {
    /// Fetch a location by slug; `Ok(None)` when Kaya does not know it.
    async fn get_location(&self, slug: &str) -> Result<Option<Location>, ClientError>;

    async fn get_sub_locations(
        &self,
        location_id: &str,
        type_filter: Option<&str>,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Location>, ClientError>;

    async fn get_climbs(
        &self,
        location_id: &str,
        type_filter: Option<ClimbCategory>,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Climb>, ClientError>;

    async fn get_ascents(
        &self,
        location_id: &str,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Ascent>, ClientError>;
}
