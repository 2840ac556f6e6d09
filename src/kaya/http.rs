//! Kaya GraphQL client over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use super::client::{ClientError, KayaClient};
use super::types::{Ascent, Climb, ClimbCategory, Location};
use crate::config::AppConfig;

const USER_AGENT: &str = concat!("climb-sync/", env!("CARGO_PKG_VERSION"));

const LOCATION_FIELDS: &str = "id slug name locationType parentId latitude longitude climbCount ascentCount description";
const CLIMB_FIELDS: &str = "slug name grade climbType locationId areaName destinationName latitude longitude rating ascentCount";

/// HTTP implementation of [`KayaClient`] against Kaya's GraphQL endpoint.
#[derive(Clone)]
pub struct KayaHttpClient {
    http: Client,
    endpoint: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct LocationData {
    location: Option<Location>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubLocationsData {
    #[serde(default)]
    sub_locations: Option<Vec<Location>>,
}

#[derive(Deserialize)]
struct ClimbsData {
    #[serde(default)]
    climbs: Option<Vec<Climb>>,
}

#[derive(Deserialize)]
struct AscentsData {
    #[serde(default)]
    ascents: Option<Vec<Ascent>>,
}

impl KayaHttpClient {
    /// Build a client for `base_url`; requests go to `<base_url>/graphql`.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let endpoint = Url::parse(base_url)?.join("graphql")?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.kaya_api_base,
            config.kaya_api_token.clone(),
            config.kaya_request_timeout(),
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, ClientError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .json(&json!({
                "operationName": operation,
                "query": query,
                "variables": variables,
            }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            warn!(operation, ?retry_after, "Rate limited by Kaya");
            return Err(ClientError::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(operation, status = status.as_u16(), "Kaya request failed");
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let envelope: GraphqlResponse<T> = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::MalformedResponse(format!("{operation}: {e}")))?;

        if !envelope.errors.is_empty() {
            let messages = envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ClientError::MalformedResponse(format!(
                "{operation}: {messages}"
            )));
        }

        debug!(operation, "Kaya request succeeded");
        envelope
            .data
            .ok_or_else(|| ClientError::MalformedResponse(format!("{operation}: missing data")))
    }
}

#[async_trait]
impl KayaClient for KayaHttpClient {
    async fn get_location(&self, slug: &str) -> Result<Option<Location>, ClientError> {
        let query = format!(
            "query getLocation($slug: String!) {{ location(slug: $slug) {{ {LOCATION_FIELDS} }} }}"
        );
        let data: LocationData = self
            .execute("getLocation", &query, json!({ "slug": slug }))
            .await?;
        Ok(data.location)
    }

    async fn get_sub_locations(
        &self,
        location_id: &str,
        type_filter: Option<&str>,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Location>, ClientError> {
        let query = format!(
            "query getSubLocations($locationId: ID!, $type: String, $offset: Int!, $count: Int!) \
             {{ subLocations(locationId: $locationId, type: $type, offset: $offset, count: $count) \
             {{ {LOCATION_FIELDS} }} }}"
        );
        let data: SubLocationsData = self
            .execute(
                "getSubLocations",
                &query,
                json!({
                    "locationId": location_id,
                    "type": type_filter,
                    "offset": offset,
                    "count": count,
                }),
            )
            .await?;
        Ok(data.sub_locations.unwrap_or_default())
    }

    async fn get_climbs(
        &self,
        location_id: &str,
        type_filter: Option<ClimbCategory>,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Climb>, ClientError> {
        let query = format!(
            "query getClimbs($locationId: ID!, $type: String, $offset: Int!, $count: Int!) \
             {{ climbs(locationId: $locationId, type: $type, offset: $offset, count: $count) \
             {{ {CLIMB_FIELDS} }} }}"
        );
        let data: ClimbsData = self
            .execute(
                "getClimbs",
                &query,
                json!({
                    "locationId": location_id,
                    "type": type_filter.map(ClimbCategory::as_filter),
                    "offset": offset,
                    "count": count,
                }),
            )
            .await?;
        Ok(data.climbs.unwrap_or_default())
    }

    async fn get_ascents(
        &self,
        location_id: &str,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Ascent>, ClientError> {
        let query = format!(
            "query getAscents($locationId: ID!, $offset: Int!, $count: Int!) \
             {{ ascents(locationId: $locationId, offset: $offset, count: $count) \
             {{ id climbSlug date grade rating comment \
             climb {{ {CLIMB_FIELDS} }} user {{ id username displayName }} }} }}"
        );
        let data: AscentsData = self
            .execute(
                "getAscents",
                &query,
                json!({
                    "locationId": location_id,
                    "offset": offset,
                    "count": count,
                }),
            )
            .await?;
        Ok(data.ascents.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_onto_base() {
        let client =
            KayaHttpClient::new("https://kaya.example.com/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://kaya.example.com/graphql");
    }

    #[test]
    fn invalid_base_is_rejected() {
        let result = KayaHttpClient::new("not a url", None, Duration::from_secs(5));
        assert!(matches!(result, Err(ClientError::Url(_))));
    }
}
