//! HTTP catalog client tests against a mock registry

use catalog_unified_search::config::CatalogConfig;
use catalog_unified_search::search::catalog::{list_bucket_names, CatalogError};
use catalog_unified_search::search::{HttpCatalogClient, SearchTransport, SessionProvider};
use mockito::Matcher;
use serde_json::json;

fn client_for(url: String, token: Option<&str>) -> HttpCatalogClient {
    HttpCatalogClient::new(&CatalogConfig {
        registry_url: Some(url),
        access_token: token.map(str::to_string),
        request_timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_list_bucket_names_over_graphql() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/graphql")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({
            "query": "query BucketConfigs { bucketConfigs { name } }"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"bucketConfigs":[{"name":"alpha"},{"name":""},{"name":"beta"}]}}"#)
        .create_async()
        .await;

    let client = client_for(server.url(), Some("secret"));
    let names = list_bucket_names(&client).await.unwrap();

    assert_eq!(names, vec!["alpha", "beta"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_graphql_errors_become_backend_errors() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .with_status(200)
        .with_body(r#"{"data":null,"errors":[{"message":"resolver failed"}]}"#)
        .create_async()
        .await;

    let client = client_for(server.url(), Some("secret"));
    let err = client.graphql("query { x }", json!({})).await.unwrap_err();

    assert!(matches!(err, CatalogError::Backend(message) if message == "resolver failed"));
}

#[tokio::test]
async fn test_search_sends_index_and_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(r"^/api/search".to_string()))
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("index".into(), "a,b".into()),
            Matcher::UrlEncoded("action".into(), "search".into()),
            Matcher::UrlEncoded("size".into(), "10".into()),
            Matcher::UrlEncoded("body".into(), r#"{"query":{"match_all":{}}}"#.into()),
        ]))
        .with_status(200)
        .with_body(r#"{"hits":{"total":{"value":0},"hits":[]}}"#)
        .create_async()
        .await;

    let client = client_for(server.url(), Some("secret"));
    let response = client
        .search(&json!({ "query": { "match_all": {} } }), "a,b", 10)
        .await
        .unwrap();

    assert_eq!(response["hits"]["total"]["value"], 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_search_forbidden_is_authorization_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/api/search".to_string()))
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body("too many indices")
        .create_async()
        .await;

    let client = client_for(server.url(), Some("secret"));
    let err = client.search(&json!({}), "a,b,c", 10).await.unwrap_err();

    assert!(err.is_authorization_failure());
    assert!(matches!(err, CatalogError::Http { status: 403, .. }));
}

#[tokio::test]
async fn test_error_payload_in_success_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/api/search".to_string()))
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"error":"TransportError(403, 'security_exception')"}"#)
        .create_async()
        .await;

    let client = client_for(server.url(), Some("secret"));
    let err = client.search(&json!({}), "a,b", 10).await.unwrap_err();

    assert!(matches!(err, CatalogError::Backend(_)));
    assert!(err.is_authorization_failure());
}

#[tokio::test]
async fn test_missing_token_fails_without_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/graphql")
        .expect(0)
        .create_async()
        .await;

    let client = client_for(server.url(), None);
    let err = client.graphql("query { x }", json!({})).await.unwrap_err();

    assert!(matches!(err, CatalogError::NotAuthenticated));
    mock.assert_async().await;
}
