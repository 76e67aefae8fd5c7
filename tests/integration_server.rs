//! End-to-end tests for the custodia HTTP surface.
//!
//! The real router, guard, cookie codec and flow controller are driven with
//! `tower::ServiceExt::oneshot`. Only the security backend and the identity
//! providers are replaced by in-process fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{ACCEPT, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
    response::Response,
};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use custodia::{
    api::{self, SecurityState},
    auth::{
        AuthFlow, RedirectPolicy,
        basic::{BasicAuthFlow, basic_header},
        openid::OpenIdFlow,
        saml::SamlFlow,
    },
    backend::{
        AuthInfo, BackendError, SecurityBackend,
        openid::{OpenIdProvider, ProviderMetadata, TokenResponse},
        saml::{SamlChallenge, SamlServiceProvider},
    },
    config::SecurityConfig,
    session::AuthType,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;
use url::Url;

const PASSWORD: &str = "0123456789abcdef0123456789abcdef";
const COOKIE_NAME: &str = "security_authentication";
const SAML_AUTHORIZATION: &str = "bearer saml-token";

/// Knows `admin:admin`, any OpenID bearer token and the SAML token.
struct FakeBackend;

#[async_trait]
impl SecurityBackend for FakeBackend {
    async fn authenticate(
        &self,
        headers: &BTreeMap<String, String>,
    ) -> Result<AuthInfo, BackendError> {
        let authorization = headers.get("authorization").map(String::as_str);
        let user_name = match authorization {
            Some(value) if value == basic_header("admin", "admin") => "admin",
            Some(value) if value.starts_with("Bearer ") => "oidc-user",
            Some(SAML_AUTHORIZATION) => "saml-user",
            _ => return Err(BackendError::Unauthorized),
        };
        Ok(AuthInfo {
            user_name: user_name.to_string(),
            roles: vec!["all_access".to_string()],
            sso_logout_url: Some("https://idp.example.com/slo".to_string()),
            ..AuthInfo::default()
        })
    }
}

/// Issues id tokens carrying whatever nonce the test hands it.
#[derive(Default)]
struct FakeProvider {
    nonce: Mutex<String>,
}

#[async_trait]
impl OpenIdProvider for FakeProvider {
    async fn metadata(&self) -> Result<ProviderMetadata, BackendError> {
        Ok(ProviderMetadata {
            issuer: Some("https://idp.example.com".to_string()),
            authorization_endpoint: "https://idp.example.com/authorize".to_string(),
            token_endpoint: "https://idp.example.com/token".to_string(),
            end_session_endpoint: Some("https://idp.example.com/logout".to_string()),
        })
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, BackendError> {
        let nonce = self
            .nonce
            .lock()
            .map(|nonce| nonce.clone())
            .map_err(|_| BackendError::Unexpected("poisoned".to_string()))?;
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"RS256"}"#);
        let payload = Base64UrlUnpadded::encode_string(
            json!({ "sub": "oidc-user", "nonce": nonce }).to_string().as_bytes(),
        );
        Ok(TokenResponse {
            id_token: format!("{header}.{payload}.signature"),
            access_token: None,
            refresh_token: None,
            expires_in: Some(300),
        })
    }
}

struct FakeSaml;

#[async_trait]
impl SamlServiceProvider for FakeSaml {
    async fn challenge(&self) -> Result<SamlChallenge, BackendError> {
        Ok(SamlChallenge {
            location: "https://idp.example.com/sso?SAMLRequest=abc".to_string(),
            request_id: "ONELOGIN_4fee3b04".to_string(),
        })
    }

    async fn exchange(
        &self,
        request_id: &str,
        _saml_response: &str,
    ) -> Result<String, BackendError> {
        if request_id == "ONELOGIN_4fee3b04" {
            Ok(SAML_AUTHORIZATION.to_string())
        } else {
            Err(BackendError::Unauthorized)
        }
    }
}

fn config(auth_type: AuthType) -> SecurityConfig {
    let mut config = SecurityConfig::new(SecretString::from(PASSWORD)).with_auth_type(auth_type);
    config.multitenancy.enabled = true;
    config.openid.client_id = Some("dashboards".to_string());
    config.openid.base_redirect_url = Some("https://dashboards.example.com".to_string());
    config
}

fn app_with(config: SecurityConfig, flow: Arc<dyn AuthFlow>) -> Result<Router> {
    let state = SecurityState::new(config, flow, Arc::new(FakeBackend))?;
    Ok(api::app(Arc::new(state)))
}

fn basic_app() -> Result<Router> {
    let config = config(AuthType::BasicAuth);
    let flow = Arc::new(BasicAuthFlow::new(
        &config,
        Arc::new(FakeBackend),
        RedirectPolicy::default(),
    ));
    app_with(config, flow)
}

fn openid_app(provider: Arc<FakeProvider>) -> Result<Router> {
    let config = config(AuthType::OpenId);
    let flow = Arc::new(OpenIdFlow::new(
        &config,
        Arc::new(FakeBackend),
        provider,
        RedirectPolicy::default(),
    ));
    app_with(config, flow)
}

fn saml_app() -> Result<Router> {
    let config = config(AuthType::Saml);
    let flow = Arc::new(SamlFlow::new(
        Arc::new(FakeBackend),
        Arc::new(FakeSaml),
        RedirectPolicy::default(),
    ));
    app_with(config, flow)
}

/// `name=value` of the session cookie set by `response`, if any.
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.starts_with(&format!("{COOKIE_NAME}=")))
        .find_map(|value| value.split(';').next().map(str::to_string))
}

fn set_cookie_header(response: &Response) -> String {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join("\n")
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn get(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    Ok(builder.body(Body::empty())?)
}

fn browser_get(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut request = get(uri, cookie)?;
    request
        .headers_mut()
        .insert(ACCEPT, "text/html,application/xhtml+xml".parse()?);
    Ok(request)
}

fn post_json(uri: &str, body: &Value, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    Ok(builder.body(Body::from(body.to_string()))?)
}

async fn basic_login(app: &Router) -> Result<String> {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({ "username": "admin", "password": "admin" }),
            None,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response).context("login did not set the session cookie")
}

#[tokio::test]
async fn health_reports_build() -> Result<()> {
    let response = basic_app()?.oneshot(get("/health", None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    let body = json_body(response).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}

#[tokio::test]
async fn authtype_reports_active_scheme() -> Result<()> {
    let response = saml_app()?.oneshot(get("/api/authtype", None)?).await?;
    let body = json_body(response).await?;
    assert_eq!(body["authType"], "saml");
    assert_eq!(body["multitenancyEnabled"], true);
    Ok(())
}

#[tokio::test]
async fn basic_login_then_guarded_request_passes() -> Result<()> {
    let app = basic_app()?;
    let cookie = basic_login(&app).await?;

    let response = app
        .clone()
        .oneshot(get("/api/v1/auth/authinfo", Some(&cookie))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["user_name"], "admin");
    Ok(())
}

#[tokio::test]
async fn basic_login_failure_is_reported() -> Result<()> {
    let response = basic_app()?
        .oneshot(post_json(
            "/auth/login",
            &json!({ "username": "admin", "password": "wrong" }),
            None,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["loginFailed"], true);
    assert_eq!(
        body["message"],
        "Invalid username or password, please try again"
    );
    Ok(())
}

#[tokio::test]
async fn guarded_route_challenges_by_client_kind() -> Result<()> {
    let app = basic_app()?;

    let response = app
        .clone()
        .oneshot(browser_get("/api/v1/auth/authinfo", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        Some("/app/login?nextUrl=%2Fapi%2Fv1%2Fauth%2Fauthinfo")
    );

    let response = app.oneshot(get("/api/v1/auth/authinfo", None)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn tampered_cookie_is_treated_as_absent() -> Result<()> {
    let app = basic_app()?;
    let response = app
        .oneshot(get(
            "/api/v1/auth/authinfo",
            Some(&format!("{COOKIE_NAME}=not-a-sealed-value")),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_route_needs_no_session() -> Result<()> {
    let response = basic_app()?.oneshot(get("/api/status", None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());
    Ok(())
}

#[tokio::test]
async fn tenant_selection_is_stored_in_the_cookie() -> Result<()> {
    let app = basic_app()?;
    let cookie = basic_login(&app).await?;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/multitenancy/tenant",
            &json!({ "tenant": "global" }),
            Some(&cookie),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).context("tenant was not saved")?;

    let response = app
        .oneshot(get("/api/v1/multitenancy/tenant", Some(&cookie))?)
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["tenant"], "global");
    Ok(())
}

#[tokio::test]
async fn logout_clears_the_session() -> Result<()> {
    let app = basic_app()?;
    let cookie = basic_login(&app).await?;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = set_cookie_header(&response);
    assert!(set_cookie.contains("Max-Age=0"), "{set_cookie}");

    let cookie = session_cookie(&response).unwrap_or_default();
    let response = app
        .oneshot(get("/api/v1/auth/authinfo", Some(&cookie))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn openid_round_trip() -> Result<()> {
    let provider = Arc::new(FakeProvider::default());
    let app = openid_app(provider.clone())?;

    let response = app
        .clone()
        .oneshot(browser_get("/auth/openid/login?nextUrl=%2Fapp%2Fdiscover", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let pending = session_cookie(&response).context("handshake was not parked")?;
    let authorize = Url::parse(location(&response).context("no redirect")?)?;
    assert_eq!(authorize.path(), "/authorize");
    let params: BTreeMap<String, String> = authorize.query_pairs().into_owned().collect();
    assert_eq!(params.get("client_id").map(String::as_str), Some("dashboards"));
    assert_eq!(
        params.get("redirect_uri").map(String::as_str),
        Some("https://dashboards.example.com/auth/openid/login")
    );
    let state = params.get("state").context("no state")?;
    let nonce = params.get("nonce").context("no nonce")?;
    if let Ok(mut current) = provider.nonce.lock() {
        current.clone_from(nonce);
    }

    let response = app
        .clone()
        .oneshot(browser_get(
            &format!("/auth/openid/login?code=abc&state={state}"),
            Some(&pending),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/app/discover"));
    let session = session_cookie(&response).context("session was not saved")?;

    let response = app
        .oneshot(get("/api/v1/auth/authinfo", Some(&session))?)
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["user_name"], "oidc-user");
    Ok(())
}

#[tokio::test]
async fn openid_callback_with_foreign_state_is_rejected() -> Result<()> {
    let app = openid_app(Arc::new(FakeProvider::default()))?;

    let response = app
        .clone()
        .oneshot(browser_get("/auth/openid/login", None)?)
        .await?;
    let pending = session_cookie(&response).context("handshake was not parked")?;

    let response = app
        .oneshot(browser_get(
            "/auth/openid/login?code=abc&state=forged",
            Some(&pending),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/app/login?loginFailed=true"));
    assert!(session_cookie(&response).is_some());
    Ok(())
}

#[tokio::test]
async fn saml_round_trip() -> Result<()> {
    let app = saml_app()?;

    let response = app
        .clone()
        .oneshot(browser_get("/auth/saml/login?nextUrl=%2Fapp%2Fdashboards", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        Some("https://idp.example.com/sso?SAMLRequest=abc")
    );
    let pending = session_cookie(&response).context("handshake was not parked")?;

    let assertion = Base64::encode_string(
        br#"<samlp:Response ID="_1" InResponseTo="ONELOGIN_4fee3b04" Version="2.0"/>"#,
    );
    let form: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("SAMLResponse", &assertion)
        .finish();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/_opendistro/_security/saml/acs")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(COOKIE, &pending)
                .body(Body::from(form))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/app/dashboards"));
    let session = session_cookie(&response).context("session was not saved")?;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/logout")
                .header(COOKIE, &session)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("https://idp.example.com/slo"));
    Ok(())
}

#[tokio::test]
async fn saml_response_answering_only_in_a_nested_element_is_refused() -> Result<()> {
    let app = saml_app()?;
    let response = app
        .clone()
        .oneshot(browser_get("/auth/saml/login", None)?)
        .await?;
    let pending = session_cookie(&response).context("handshake was not parked")?;

    let assertion = Base64::encode_string(
        br#"<samlp:Response ID="_1" Version="2.0"><saml:Assertion><saml:Subject><saml:SubjectConfirmation><saml:SubjectConfirmationData InResponseTo="ONELOGIN_4fee3b04"/></saml:SubjectConfirmation></saml:Subject></saml:Assertion></samlp:Response>"#,
    );
    let form: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("SAMLResponse", &assertion)
        .finish();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/_opendistro/_security/saml/acs")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(COOKIE, &pending)
                .body(Body::from(form))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/app/login?loginFailed=true"));
    Ok(())
}
