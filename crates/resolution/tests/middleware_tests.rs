//! Integration tests for the axum request boundary.
//!
//! A stand-in authentication layer turns the `x-test-claims` header
//! (`name=value;name=value`) into `IdentityClaims`, the way a real
//! authentication middleware would after verifying a token.

mod common;

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{Next, from_fn, from_fn_with_state},
    response::Response,
    routing::get,
};
use axum_test::TestServer;
use serde_json::{Value, json};

use palisade_resolution::{
    Claim, IdentityClaims, ResolutionConfig, ResolverState, TenantHolder, build_resolver,
    resolve_tenant,
};

const X_TENANT_ID: HeaderName = HeaderName::from_static("x-tenant-id");
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_TEST_CLAIMS: HeaderName = HeaderName::from_static("x-test-claims");
const HOST: HeaderName = HeaderName::from_static("host");

async fn whoami(holder: TenantHolder) -> Result<Json<Value>, StatusCode> {
    let context = holder
        .context()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({
        "tenantId": context.tenant_id().map(|t| t.as_str()),
        "system": context.is_system(),
        "source": context.source(),
        "correlationId": context.correlation_id(),
        "userId": context.user_id(),
    })))
}

async fn fake_auth(mut request: Request, next: Next) -> Response {
    let claims = request
        .headers()
        .get(&X_TEST_CLAIMS)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            IdentityClaims::new(
                raw.split(';')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(name, value)| Claim::new(name, value)),
            )
        });
    if let Some(claims) = claims {
        request.extensions_mut().insert(claims);
    }
    next.run(request).await
}

fn create_test_server(config: ResolutionConfig) -> TestServer {
    let resolver = build_resolver(&config, common::directory()).expect("valid configuration");

    let app = Router::new()
        .route("/whoami", get(whoami))
        .route("/{tenant}/whoami", get(whoami))
        .layer(from_fn_with_state(ResolverState::new(resolver), resolve_tenant))
        .layer(from_fn(fake_auth));

    TestServer::new(app).expect("Failed to create test server")
}

// =============================================================================
// Successful Resolution
// =============================================================================

#[tokio::test]
async fn test_header_tenant_reaches_handler() {
    let server = create_test_server(ResolutionConfig::default());

    let response = server
        .get("/whoami")
        .add_header(X_TENANT_ID, HeaderValue::from_static("t-acme"))
        .add_header(X_REQUEST_ID, HeaderValue::from_static("req-1"))
        .add_header(X_TEST_CLAIMS, HeaderValue::from_static("sub=alice"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tenantId"], "t-acme");
    assert_eq!(body["source"], "header:X-Tenant-ID");
    assert_eq!(body["correlationId"], "req-1");
    assert_eq!(body["userId"], "alice");
}

#[tokio::test]
async fn test_subdomain_tenant_reaches_handler() {
    let server = create_test_server(ResolutionConfig::default());

    let response = server
        .get("/whoami")
        .add_header(HOST, HeaderValue::from_static("contoso.app.com"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tenantId"], "t-contoso");
    assert!(body["correlationId"].is_string());
}

#[tokio::test]
async fn test_path_tenant_reaches_handler() {
    let config = ResolutionConfig {
        strategies: vec![palisade_resolution::StrategyKind::Path],
        ..Default::default()
    };
    let server = create_test_server(config);

    let response = server.get("/initech/whoami").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tenantId"], "t-initech");
    assert_eq!(body["source"], "path:initech");
}

#[tokio::test]
async fn test_admin_claim_gets_system_context() {
    let server = create_test_server(ResolutionConfig::for_testing());

    let response = server
        .get("/whoami")
        .add_header(X_TEST_CLAIMS, HeaderValue::from_static("role=system-admin;sub=root"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["system"], true);
    assert!(body["tenantId"].is_null());
    assert_eq!(body["userId"], "root");
}

// =============================================================================
// Failure Responses
// =============================================================================

#[tokio::test]
async fn test_missing_signal_is_bad_request() {
    let server = create_test_server(ResolutionConfig::default());

    let response = server.get("/whoami").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "tenant-unresolved");
    assert_eq!(body["failures"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_unknown_tenant_is_not_found() {
    let server = create_test_server(ResolutionConfig::default());

    let response = server
        .get("/whoami")
        .add_header(X_TENANT_ID, HeaderValue::from_static("umbrella"))
        .await;

    response.assert_status_not_found();
    let body: Value = response.json();
    let failures = body["failures"].as_array().cloned().unwrap_or_default();
    assert!(failures.iter().any(|f| f["attempted_identifier"] == "umbrella"));
}

#[tokio::test]
async fn test_domain_mismatch_is_forbidden() {
    let config = ResolutionConfig {
        strategies: vec![palisade_resolution::StrategyKind::Claim],
        domain_validation: palisade_resolution::DomainValidationMode::ValidateAgainstSubdomain,
        ..Default::default()
    };
    let server = create_test_server(config);

    let response = server
        .get("/whoami")
        .add_header(HOST, HeaderValue::from_static("initech.app.com"))
        .add_header(X_TEST_CLAIMS, HeaderValue::from_static("tenants=acme,contoso"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_extractor_without_middleware_is_server_error() {
    let app = Router::new().route("/whoami", get(whoami));
    let server = TestServer::new(app).expect("Failed to create test server");

    let response = server.get("/whoami").await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}
