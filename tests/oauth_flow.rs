mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{callback_query, harness, harness_with_timeout, query_param, TOKEN_PATH};
use integrations_auth::crypto::challenge_for;
use integrations_auth::flow::CALLBACK_CLOSE_HTML;
use integrations_auth::store::KeyValueStore;
use integrations_auth::AuthError;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn token_ok(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 1800,
        "token_type": "bearer"
    }))
}

#[tokio::test]
async fn authorize_url_has_client_state_and_encoded_redirect() {
    let h = harness().await;
    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();

    assert!(url.starts_with("https://app.hubspot.com/oauth/authorize?"));
    assert!(url.contains("client_id=cid"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains(
        "redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fintegrations%2Fhubspot%2Foauth2callback"
    ));
    let state = query_param(&url, "state").unwrap();
    assert!(!state.is_empty());

    let stored = h.transient.get("hubspot_state:acme:u1").await.unwrap();
    assert_eq!(stored.as_deref(), Some(state.as_str()));
}

#[tokio::test]
async fn authorize_issues_fresh_state_each_time() {
    let h = harness().await;
    let first = h.gateway.authorize("notion", "u1", "acme").await.unwrap();
    let second = h.gateway.authorize("notion", "u1", "acme").await.unwrap();
    let (s1, s2) = (
        query_param(&first, "state").unwrap(),
        query_param(&second, "state").unwrap(),
    );
    assert_ne!(s1, s2);

    // the older link no longer validates
    let err = h
        .gateway
        .oauth_callback("notion", &callback_query("ABC123", &s1))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn authorize_requires_identity() {
    let h = harness().await;
    let err = h.gateway.authorize("hubspot", "", "acme").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest(_)));
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let h = harness().await;
    let err = h.gateway.authorize("dropbox", "u1", "acme").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderNotFound(p) if p == "dropbox"));
}

#[tokio::test]
async fn callback_exchanges_code_and_stores_row() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=ABC123"))
        .and(body_string_contains("client_secret=secret"))
        .respond_with(token_ok("A1", "R1"))
        .expect(1)
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();
    let state = query_param(&url, "state").unwrap();

    let page = h
        .gateway
        .oauth_callback("hubspot", &callback_query("ABC123", &state))
        .await
        .unwrap();
    assert_eq!(page, CALLBACK_CLOSE_HTML);

    let row = h
        .gateway
        .tokens()
        .get_token("hubspot", "u1", "acme")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_token, "A1");
    assert_eq!(row.refresh_token.as_deref(), Some("R1"));
    assert!(row.expires_at.is_some());

    assert_eq!(
        h.gateway
            .tokens()
            .count_events("acme", "u1", "oauth.connected")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn mismatched_state_is_rejected_and_real_state_survives() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok("A1", "R1"))
        .expect(1)
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("notion", "u1", "acme").await.unwrap();
    let state = query_param(&url, "state").unwrap();

    // same identity, different nonce
    let forged = "notion:forged-nonce:u1:acme";
    let err = h
        .gateway
        .oauth_callback("notion", &callback_query("ABC123", forged))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));

    h.gateway
        .oauth_callback("notion", &callback_query("ABC123", &state))
        .await
        .unwrap();
}

#[tokio::test]
async fn state_is_single_use() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok("A1", "R1"))
        .expect(1)
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();
    let query = callback_query("ABC123", &query_param(&url, "state").unwrap());

    h.gateway.oauth_callback("hubspot", &query).await.unwrap();
    let replay = h.gateway.oauth_callback("hubspot", &query).await.unwrap_err();
    assert!(matches!(replay, AuthError::InvalidState));
}

#[tokio::test]
async fn state_without_pending_authorization_is_rejected() {
    let h = harness().await;
    let err = h
        .gateway
        .oauth_callback("notion", &callback_query("ABC123", "notion:abc:u1:acme"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));

    let err = h
        .gateway
        .oauth_callback("hubspot", &callback_query("ABC123", "%%%not-base64"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn provider_error_and_missing_params_are_invalid_requests() {
    let h = harness().await;

    let denied = HashMap::from([
        ("error".to_string(), "access_denied".to_string()),
        ("error_description".to_string(), "User declined".to_string()),
    ]);
    let err = h.gateway.oauth_callback("hubspot", &denied).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest(msg) if msg == "User declined"));

    let bare_error = HashMap::from([("error".to_string(), "access_denied".to_string())]);
    let err = h.gateway.oauth_callback("hubspot", &bare_error).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest(msg) if msg == "access_denied"));

    let no_code = HashMap::from([("state".to_string(), "abc".to_string())]);
    let err = h.gateway.oauth_callback("hubspot", &no_code).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest(_)));
}

#[tokio::test]
async fn token_endpoint_failure_carries_status_and_body() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();
    let state = query_param(&url, "state").unwrap();
    let err = h
        .gateway
        .oauth_callback("hubspot", &callback_query("BAD", &state))
        .await
        .unwrap_err();

    match err {
        AuthError::TokenExchangeFailed { status, body } => {
            assert_eq!(status, Some(400));
            assert_eq!(body, "invalid_grant");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h
        .gateway
        .tokens()
        .get_token("hubspot", "u1", "acme")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn token_endpoint_timeout_is_exchange_failure() {
    let h = harness_with_timeout(Duration::from_millis(200)).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok("A1", "R1").set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();
    let state = query_param(&url, "state").unwrap();
    let err = h
        .gateway
        .oauth_callback("hubspot", &callback_query("ABC123", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExchangeFailed { status: None, .. }));
}

#[tokio::test]
async fn credentials_are_delivered_once() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok("A1", "R1"))
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();
    let state = query_param(&url, "state").unwrap();
    h.gateway
        .oauth_callback("hubspot", &callback_query("ABC123", &state))
        .await
        .unwrap();

    let blob = h
        .gateway
        .consume_credentials("hubspot", "u1", "acme")
        .await
        .unwrap();
    assert_eq!(blob.tokens.access_token, "A1");
    assert_eq!(blob.user_id, "u1");
    assert_eq!(blob.org_id, "acme");
    assert_eq!(blob.tokens.extra.get("token_type").unwrap(), "bearer");

    let again = h
        .gateway
        .consume_credentials("hubspot", "u1", "acme")
        .await
        .unwrap_err();
    assert!(matches!(again, AuthError::NotFound(_)));
}

#[tokio::test]
async fn credentials_never_issued_are_not_found() {
    let h = harness().await;
    let err = h
        .gateway
        .consume_credentials("notion", "u1", "acme")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn notion_uses_basic_auth() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("authorization", "Basic Y2lkOnNlY3JldA=="))
        .and(body_string_contains("code=ABC123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "N1",
            "token_type": "bearer",
            "workspace_id": "ws-1"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("notion", "u1", "acme").await.unwrap();
    assert!(url.contains("owner=user"));
    let state = query_param(&url, "state").unwrap();
    h.gateway
        .oauth_callback("notion", &callback_query("ABC123", &state))
        .await
        .unwrap();

    let row = h
        .gateway
        .tokens()
        .get_token("notion", "u1", "acme")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_token, "N1");
    assert_eq!(row.expires_at, None);
}

#[tokio::test]
async fn airtable_sends_pkce_verifier() {
    let h = harness().await;
    let url = h.gateway.authorize("airtable", "u1", "acme").await.unwrap();
    let challenge = query_param(&url, "code_challenge").unwrap();
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));

    let verifier = h
        .transient
        .get("airtable_verifier:acme:u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(challenge_for(&verifier), challenge);

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("authorization", "Basic Y2lkOnNlY3JldA=="))
        .and(body_string_contains(format!("code_verifier={verifier}").as_str()))
        .respond_with(token_ok("AT1", "RT1"))
        .expect(1)
        .mount(&h.server)
        .await;

    let state = query_param(&url, "state").unwrap();
    h.gateway
        .oauth_callback("airtable", &callback_query("ABC123", &state))
        .await
        .unwrap();

    // verifier is consumed along with the state
    assert!(h
        .transient
        .get("airtable_verifier:acme:u1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn airtable_without_verifier_is_invalid_state() {
    let h = harness().await;
    let url = h.gateway.authorize("airtable", "u1", "acme").await.unwrap();
    h.transient.delete("airtable_verifier:acme:u1").await.unwrap();

    let state = query_param(&url, "state").unwrap();
    let err = h
        .gateway
        .oauth_callback("airtable", &callback_query("ABC123", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn disconnect_removes_row() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok("A1", "R1"))
        .mount(&h.server)
        .await;

    let url = h.gateway.authorize("hubspot", "u1", "acme").await.unwrap();
    let state = query_param(&url, "state").unwrap();
    h.gateway
        .oauth_callback("hubspot", &callback_query("ABC123", &state))
        .await
        .unwrap();

    let conns = h.gateway.list_connections("u1", "acme").await.unwrap();
    assert_eq!(conns.len(), 1);
    assert!(conns[0].has_refresh_token);

    h.gateway.disconnect("hubspot", "u1", "acme").await.unwrap();
    assert!(h.gateway.list_connections("u1", "acme").await.unwrap().is_empty());
    assert!(matches!(
        h.gateway.disconnect("hubspot", "u1", "acme").await,
        Err(AuthError::NotFound(_))
    ));
}

#[tokio::test]
async fn identities_with_delimiter_in_ids_do_not_collide() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_ok("B_TOKEN", "B_REFRESH"))
        .expect(1)
        .mount(&h.server)
        .await;

    let url_a = h.gateway.authorize("hubspot", "c", "a:b").await.unwrap();
    let url_b = h.gateway.authorize("hubspot", "b:c", "a").await.unwrap();

    let state_b = query_param(&url_b, "state").unwrap();
    h.gateway
        .oauth_callback("hubspot", &callback_query("ABC123", &state_b))
        .await
        .unwrap();

    // B's credentials are not visible to A
    let err = h
        .gateway
        .consume_credentials("hubspot", "c", "a:b")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));

    // A's pending state survived B's authorize
    let state_a = query_param(&url_a, "state").unwrap();
    let stored = h.transient.get("hubspot_state:a%3Ab:c").await.unwrap();
    assert_eq!(stored.as_deref(), Some(state_a.as_str()));

    let blob = h
        .gateway
        .consume_credentials("hubspot", "b:c", "a")
        .await
        .unwrap();
    assert_eq!(blob.tokens.access_token, "B_TOKEN");
    assert_eq!((blob.user_id.as_str(), blob.org_id.as_str()), ("b:c", "a"));
}
