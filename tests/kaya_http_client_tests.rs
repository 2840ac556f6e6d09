use std::time::Duration;

use climb_sync::kaya::{ClientError, ClimbCategory, KayaClient, KayaHttpClient};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn client_for(server: &MockServer, token: Option<&str>) -> KayaHttpClient {
    KayaHttpClient::new(
        &server.uri(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .expect("valid mock server url")
}

#[tokio::test]
async fn get_location_sends_bearer_and_decodes_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer kaya-token"))
        .and(body_partial_json(json!({
            "operationName": "getLocation",
            "variables": { "slug": "red-rock" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "location": {
                    "id": "loc-1",
                    "slug": "red-rock",
                    "name": "Red Rock",
                    "locationType": "area",
                    "latitude": 36.13,
                    "longitude": -115.43,
                    "climbCount": 2400
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("kaya-token"));
    let location = client
        .get_location("red-rock")
        .await
        .unwrap()
        .expect("location present");

    assert_eq!(location.id, "loc-1");
    assert_eq!(location.location_type.as_deref(), Some("area"));
    assert_eq!(location.climb_count, Some(2400));
    assert!(location.parent_id.is_none());
}

#[tokio::test]
async fn unknown_location_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "location": null }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    assert!(client.get_location("nowhere").await.unwrap().is_none());
}

#[tokio::test]
async fn get_climbs_passes_paging_and_category() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "operationName": "getClimbs",
            "variables": { "locationId": "loc-1", "type": "boulder", "offset": 20, "count": 20 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "climbs": [
                    { "slug": "the-mandala", "name": "The Mandala", "grade": "V12", "areaName": "Buttermilks" },
                    { "slug": "iron-man", "name": "Iron Man Traverse", "grade": "V4" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let climbs = client
        .get_climbs("loc-1", Some(ClimbCategory::Boulder), 20, 20)
        .await
        .unwrap();

    assert_eq!(climbs.len(), 2);
    assert_eq!(climbs[0].area_name.as_deref(), Some("Buttermilks"));
    assert!(climbs[1].latitude.is_none());
}

#[tokio::test]
async fn ascents_embed_climb_and_user() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "ascents": [{
                    "id": "asc-1",
                    "date": "2026-03-14T00:00:00Z",
                    "climb": { "slug": "the-mandala", "name": "The Mandala" },
                    "user": { "id": "u-1", "username": "sharma" }
                }]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let ascents = client.get_ascents("loc-1", 0, 20).await.unwrap();

    assert_eq!(ascents.len(), 1);
    assert_eq!(ascents[0].resolved_climb_slug(), Some("the-mandala"));
    assert_eq!(ascents[0].user.as_ref().map(|u| u.username.as_str()), Some("sharma"));
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client.get_sub_locations("loc-1", None, 0, 20).await.unwrap_err();

    assert!(matches!(err, ClientError::RateLimited { retry_after: Some(30) }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn rejected_credentials_are_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server, Some("expired"));
    let err = client.get_location("red-rock").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized { status: 401 }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_errors_keep_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client.get_ascents("loc-1", 0, 20).await.unwrap_err();
    match &err {
        ClientError::Http { status, body } => {
            assert_eq!(*status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn graphql_errors_are_malformed_responses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Unknown location" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client
        .get_climbs("loc-1", Some(ClimbCategory::Route), 0, 20)
        .await
        .unwrap_err();
    match err {
        ClientError::MalformedResponse(message) => assert!(message.contains("Unknown location")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client.get_location("red-rock").await.unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse(_)));
}
