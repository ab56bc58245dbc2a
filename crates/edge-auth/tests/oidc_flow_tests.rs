//! OIDC flow integration tests.
//!
//! Drives login, callback and logout against a spawned server and a mock
//! identity provider. Session cookies are `Secure`, so the tests forward
//! cookies by hand instead of relying on a cookie store over plain HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum_extra::extract::cookie::Cookie;
use common::edge_token::{decode_signing_key, EdgeToken};
use ea_test_utils::{
    test_vars, IdTokenBuilder, MockIdp, TestEdgeServer, TestSigningKey, TEST_AUTH_URL,
    TEST_CLIENT_ID, TEST_SIGNING_SECRET_HEX,
};
use reqwest::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
use serde_json::{json, Value};
use url::Url;

fn set_cookie_headers(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn find_cookie<'a>(set_cookies: &'a [String], name: &str) -> Option<&'a str> {
    set_cookies
        .iter()
        .find(|header| header.starts_with(&format!("{name}=")))
        .map(String::as_str)
}

/// Raw value of a `Set-Cookie` header (between the first `=` and `;`).
fn raw_value(set_cookie: &str) -> &str {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value)
        .unwrap()
}

/// `Cookie` request header echoing the `name=value` pairs a response set.
fn cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|header| header.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

struct LoginState {
    nonce: String,
    cookies: String,
}

async fn login(server: &TestEdgeServer, return_url: &str) -> Result<LoginState, anyhow::Error> {
    let response = server
        .client()
        .get(format!("{}/oidc/login", server.url()))
        .query(&[("url", return_url)])
        .send()
        .await?;
    assert_eq!(response.status(), 302);

    let redirect = Url::parse(&location(&response))?;
    let nonce = redirect
        .query_pairs()
        .find(|(name, _)| name == "nonce")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    Ok(LoginState {
        nonce,
        cookies: cookie_header(&set_cookie_headers(&response)),
    })
}

async fn callback(
    server: &TestEdgeServer,
    cookies: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(server
        .client()
        .get(format!("{}/oidc/callback?code=auth-code", server.url()))
        .header(COOKIE, cookies)
        .send()
        .await?)
}

fn id_token_for(key: &TestSigningKey, email: &str, nonce: &str) -> String {
    key.sign(
        &IdTokenBuilder::new()
            .with_email(email)
            .with_nonce(nonce)
            .build(),
    )
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_redirects_to_authorization_endpoint() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let response = server
        .client()
        .get(format!("{}/oidc/login?url=/app/page", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 302);
    let redirect = Url::parse(&location(&response))?;
    assert!(redirect.as_str().starts_with(TEST_AUTH_URL));

    let params: std::collections::HashMap<String, String> =
        redirect.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], TEST_CLIENT_ID);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["scope"], "openid email");
    assert_eq!(params["prompt"], "consent");
    assert_eq!(
        params["redirect_uri"],
        format!("https://{}/oidc/callback", server.addr())
    );
    assert_eq!(params["nonce"].len(), 32);

    let set_cookies = set_cookie_headers(&response);
    let nonce_cookie = find_cookie(&set_cookies, "nonce").unwrap();
    assert_eq!(raw_value(nonce_cookie), params["nonce"]);
    assert!(nonce_cookie.contains("Path=/oidc/"));
    assert!(nonce_cookie.contains("HttpOnly"));
    assert!(nonce_cookie.contains("Secure"));

    let url_cookie = Cookie::parse_encoded(find_cookie(&set_cookies, "oidcurl").unwrap())?;
    assert_eq!(url_cookie.value(), "/app/page");
    assert_eq!(url_cookie.path(), Some("/oidc/"));

    Ok(())
}

#[tokio::test]
async fn test_login_nonces_differ_between_requests() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let first = login(&server, "/").await?;
    let second = login(&server, "/").await?;
    assert_ne!(first.nonce, second.nonce);

    Ok(())
}

#[tokio::test]
async fn test_login_ignores_absolute_return_url() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let response = server
        .client()
        .get(format!("{}/oidc/login", server.url()))
        .query(&[("url", "https://evil.example/steal")])
        .send()
        .await?;

    let set_cookies = set_cookie_headers(&response);
    let url_cookie = Cookie::parse_encoded(find_cookie(&set_cookies, "oidcurl").unwrap())?;
    assert_eq!(url_cookie.value(), "/");

    Ok(())
}

#[tokio::test]
async fn test_login_honours_forwarded_proto() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let response = server
        .client()
        .get(format!("{}/oidc/login", server.url()))
        .header("x-forwarded-proto", "http")
        .send()
        .await?;

    let redirect = Url::parse(&location(&response))?;
    let redirect_uri = redirect
        .query_pairs()
        .find(|(name, _)| name == "redirect_uri")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    assert_eq!(redirect_uri, format!("http://{}/oidc/callback", server.addr()));

    Ok(())
}

// ============================================================================
// Callback
// ============================================================================

#[tokio::test]
async fn test_callback_grants_session() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    let key = TestSigningKey::rsa_a("rsa-a")?;

    let state = login(&server, "/app").await?;
    let id_token = id_token_for(&key, "alice@example.com", &state.nonce);
    idp.mount_token_success(&id_token, 3600).await;

    let response = callback(&server, &state.cookies).await?;

    assert_eq!(response.status(), 302);
    assert_eq!(location(&response), "/app");

    let set_cookies = set_cookie_headers(&response);
    assert_eq!(set_cookies.len(), 2);

    let token_cookie = find_cookie(&set_cookies, "__token__").unwrap();
    assert!(token_cookie.contains("Path=/"));
    assert!(token_cookie.contains("Domain=example.com"));
    assert!(token_cookie.contains("Max-Age=3600"));
    assert!(token_cookie.contains("Secure"));
    assert!(token_cookie.contains("HttpOnly"));

    let edge_token = EdgeToken::parse(raw_value(token_cookie))?;
    let key_bytes = decode_signing_key(TEST_SIGNING_SECRET_HEX)?;
    edge_token.verify(&key_bytes, chrono::Utc::now().timestamp())?;
    assert_eq!(edge_token.acl(), ["/*".to_string()]);
    assert_eq!(edge_token.payload(), Some("alice@example.com"));
    assert_eq!(edge_token.window_seconds(), 3600);

    let jwt_cookie = find_cookie(&set_cookies, "__jwt__").unwrap();
    assert_eq!(raw_value(jwt_cookie), id_token);
    assert!(!jwt_cookie.contains("HttpOnly"));

    Ok(())
}

#[tokio::test]
async fn test_callback_nonce_mismatch_is_forbidden() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    let key = TestSigningKey::rsa_a("rsa-a")?;

    let state = login(&server, "/app").await?;
    idp.mount_token_success(&id_token_for(&key, "alice@example.com", &state.nonce), 3600)
        .await;

    let response = callback(&server, "nonce=someone-elses-nonce; oidcurl=%2Fapp").await?;

    assert_eq!(response.status(), 403);
    assert!(set_cookie_headers(&response).is_empty());
    assert_eq!(response.text().await?, "Nonce failed");

    Ok(())
}

#[tokio::test]
async fn test_callback_without_nonce_cookie_is_forbidden() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    let key = TestSigningKey::rsa_a("rsa-a")?;

    let state = login(&server, "/app").await?;
    idp.mount_token_success(&id_token_for(&key, "alice@example.com", &state.nonce), 3600)
        .await;

    let response = callback(&server, "oidcurl=%2Fapp").await?;
    assert_eq!(response.status(), 403);

    Ok(())
}

#[tokio::test]
async fn test_callback_missing_code_skips_token_endpoint() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.expect_no_token_calls().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let state = login(&server, "/app").await?;
    let response = server
        .client()
        .get(format!("{}/oidc/callback", server.url()))
        .header(COOKIE, &state.cookies)
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "precondition");
    assert!(body["description"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_callback_denies_other_domains() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    let key = TestSigningKey::rsa_a("rsa-a")?;

    let state = login(&server, "/app").await?;
    idp.mount_token_success(&id_token_for(&key, "mallory@evil.example", &state.nonce), 3600)
        .await;

    let response = callback(&server, &state.cookies).await?;

    assert_eq!(response.status(), 403);
    assert!(set_cookie_headers(&response).is_empty());
    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!({"info": "restricted area, access limited to @example.com accounts"})
    );

    Ok(())
}

#[tokio::test]
async fn test_callback_denies_unverified_email() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    let key = TestSigningKey::rsa_a("rsa-a")?;

    let state = login(&server, "/app").await?;
    let id_token = key.sign(
        &IdTokenBuilder::new()
            .with_email("alice@example.com")
            .unverified()
            .with_nonce(&state.nonce)
            .build(),
    );
    idp.mount_token_success(&id_token, 3600).await;

    let response = callback(&server, &state.cookies).await?;
    assert_eq!(response.status(), 403);

    Ok(())
}

#[tokio::test]
async fn test_callback_relays_structured_token_error() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    idp.mount_token_error_json(
        400,
        json!({"error": "invalid_grant", "error_description": "code expired"}),
    )
    .await;

    let state = login(&server, "/app").await?;
    let response = callback(&server, &state.cookies).await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(body["error_description"], "code expired");
    assert_eq!(body["url"], "/app");

    Ok(())
}

#[tokio::test]
async fn test_callback_relays_raw_token_error() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    idp.mount_token_error_text(401, "unauthorized client").await;

    let state = login(&server, "/app").await?;
    let response = callback(&server, &state.cookies).await?;

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "callback_failure");
    assert_eq!(body["details"], "unauthorized client");
    assert_eq!(body["path"], idp.token_url());

    Ok(())
}

#[tokio::test]
async fn test_callback_rejects_non_positive_lifetime() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    let key = TestSigningKey::rsa_a("rsa-a")?;

    let state = login(&server, "/app").await?;
    idp.mount_token_success(&id_token_for(&key, "alice@example.com", &state.nonce), 0)
        .await;

    let response = callback(&server, &state.cookies).await?;

    assert_eq!(response.status(), 502);
    assert!(set_cookie_headers(&response).is_empty());
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "UPSTREAM_FAILURE");

    Ok(())
}

#[tokio::test]
async fn test_callback_rejects_undecodable_id_token() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
    idp.mount_token_success("not-a-jwt", 3600).await;

    let state = login(&server, "/app").await?;
    let response = callback(&server, &state.cookies).await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "DECODE_FAILURE");

    Ok(())
}

#[tokio::test]
async fn test_callback_verifies_id_token_when_enabled() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let mut vars = test_vars(&idp);
    vars.insert("ROUTE_OIDC_VERIFY_ID_TOKEN".to_string(), "true".to_string());
    let server = TestEdgeServer::spawn(vars).await?;

    let published = TestSigningKey::rsa_a("rsa-a")?;
    let unpublished = TestSigningKey::rsa_b("rsa-b")?;
    idp.mount_jwks(&[&published]).await;

    // Signed by a key the IdP does not publish.
    let state = login(&server, "/app").await?;
    idp.mount_token_success(
        &id_token_for(&unpublished, "alice@example.com", &state.nonce),
        3600,
    )
    .await;
    let response = callback(&server, &state.cookies).await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");

    // Signed by the published key.
    idp.reset().await;
    idp.mount_jwks(&[&published]).await;
    let state = login(&server, "/app").await?;
    idp.mount_token_success(
        &id_token_for(&published, "alice@example.com", &state.nonce),
        3600,
    )
    .await;
    let response = callback(&server, &state.cookies).await?;
    assert_eq!(response.status(), 302);

    Ok(())
}

// ============================================================================
// Logout and routing
// ============================================================================

#[tokio::test]
async fn test_logout_deletes_session_cookies() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let response = server
        .client()
        .get(format!("{}/oidc/logout", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 302);
    assert_eq!(location(&response), "/");

    let set_cookies = set_cookie_headers(&response);
    assert_eq!(set_cookies.len(), 2);
    for name in ["__token__", "__jwt__"] {
        let cookie = find_cookie(&set_cookies, name).unwrap();
        assert_eq!(raw_value(cookie), "");
        assert!(cookie.contains("Max-Age=-1"), "{cookie}");
        assert!(cookie.contains("Domain=example.com"));
    }

    Ok(())
}

#[tokio::test]
async fn test_unknown_step_on_configured_route_is_404() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestEdgeServer::spawn(test_vars(&idp)).await?;

    let response = server
        .client()
        .get(format!("{}/oidc/token", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await?, "No route for /oidc/token");

    Ok(())
}

#[tokio::test]
async fn test_derived_token_endpoint_requires_allowed_hosts() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let mut vars = test_vars(&idp);
    vars.remove("ROUTE_OIDC_TOKEN_URL");

    assert!(TestEdgeServer::spawn(vars).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_callback_rejects_host_outside_allow_list() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let other = MockIdp::start().await;
    let mut vars = test_vars(&idp);
    vars.remove("ROUTE_OIDC_TOKEN_URL");
    vars.insert("ALLOWED_HOSTS".to_string(), "edge.example.com".to_string());
    let server = TestEdgeServer::spawn(vars).await?;

    // Without the allow-list this would derive http://<other>/oidc/token and
    // post the client secret there.
    let response = server
        .client()
        .get(format!("{}/oidc/callback?code=abc", server.url()))
        .header(HOST, other.host())
        .header("x-forwarded-proto", "http")
        .header(COOKIE, "nonce=abc")
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    assert!(set_cookie_headers(&response).is_empty());
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "precondition");
    assert_eq!(body["description"], "Host not allowed");
    assert_eq!(other.received_request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_login_rejects_host_outside_allow_list() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let mut vars = test_vars(&idp);
    vars.insert("ALLOWED_HOSTS".to_string(), "edge.example.com".to_string());
    let server = TestEdgeServer::spawn(vars).await?;

    let spoofed = server
        .client()
        .get(format!("{}/oidc/login", server.url()))
        .header(HOST, "attacker.example")
        .send()
        .await?;
    assert_eq!(spoofed.status(), 400);

    let allowed = server
        .client()
        .get(format!("{}/oidc/login", server.url()))
        .header(HOST, "edge.example.com")
        .send()
        .await?;
    assert_eq!(allowed.status(), 302);
    let redirect = Url::parse(&location(&allowed))?;
    let redirect_uri = redirect
        .query_pairs()
        .find(|(name, _)| name == "redirect_uri")
        .map(|(_, value)| value.into_owned());
    assert_eq!(
        redirect_uri.as_deref(),
        Some("https://edge.example.com/oidc/callback")
    );

    Ok(())
}
