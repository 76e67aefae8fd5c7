//! SAML login start and assertion consumer.

use axum::{
    extract::{Extension, Form, Query},
    http::HeaderMap,
    response::Response,
};
use base64ct::{Base64, Encoding};
use quick_xml::{Reader, events::Event};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ErrorBody, SecurityState, respond},
    auth::FlowRequest,
    now_millis,
};

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct SamlLoginQuery {
    /// Where to land after login.
    #[serde(rename = "nextUrl")]
    next_url: Option<String>,
}

/// HTTP-POST binding body sent by the IdP.
#[derive(Deserialize, ToSchema, Debug)]
pub struct AcsForm {
    #[serde(rename = "SAMLResponse")]
    saml_response: String,
    #[serde(rename = "RelayState", default)]
    relay_state: Option<String>,
}

/// `InResponseTo` of a base64 encoded `<samlp:Response>`.
///
/// Only the root `Response` element is consulted; attributes of nested
/// elements such as `SubjectConfirmationData` never count. Returns `None` for
/// unsolicited responses and undecodable payloads.
fn in_response_to(saml_response: &str) -> Option<String> {
    let compact: String = saml_response
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let xml = match Base64::decode_vec(&compact) {
        Ok(bytes) => String::from_utf8(bytes).ok()?,
        Err(err) => {
            debug!("SAMLResponse is not base64: {err}");
            return None;
        }
    };

    let mut reader = Reader::from_str(&xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(root) | Event::Empty(root)) => {
                if root.local_name().as_ref() != b"Response" {
                    debug!("SAMLResponse root is not a Response element");
                    return None;
                }
                return root
                    .attributes()
                    .flatten()
                    .find(|attr| attr.key.local_name().as_ref() == b"InResponseTo")
                    .and_then(|attr| attr.unescape_value().ok())
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty());
            }
            Ok(Event::Eof) => return None,
            Err(err) => {
                debug!("SAMLResponse is not well-formed XML: {err}");
                return None;
            }
            Ok(_) => {}
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/saml/login",
    params(SamlLoginQuery),
    responses (
        (status = 302, description = "Redirect to the IdP"),
        (status = 503, description = "Backend could not issue a SAML request", body = ErrorBody)
    ),
    tag = "auth",
)]
/// Start a service-provider initiated SAML login.
pub async fn login(
    Extension(state): Extension<Arc<SecurityState>>,
    headers: HeaderMap,
    Query(query): Query<SamlLoginQuery>,
) -> Response {
    let cookie = state.cookies.read(&headers);
    let transition = state
        .controller
        .handle(
            cookie,
            FlowRequest::StartLogin {
                next_url: query.next_url,
            },
            now_millis(),
        )
        .await;
    respond::transition(&state, transition, true)
}

#[utoipa::path(
    post,
    path = "/_opendistro/_security/saml/acs",
    request_body(content = AcsForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 302, description = "Session established, redirect to the app"),
        (status = 401, description = "Response does not answer the pending request", body = ErrorBody),
        (status = 503, description = "Backend unavailable", body = ErrorBody)
    ),
    tag = "auth",
)]
/// Consume the IdP's `SAMLResponse`.
pub async fn acs(
    Extension(state): Extension<Arc<SecurityState>>,
    headers: HeaderMap,
    Form(form): Form<AcsForm>,
) -> Response {
    if let Some(relay_state) = &form.relay_state {
        debug!("Ignoring RelayState {relay_state:?}; the next URL is kept in the session");
    }
    let in_response_to = in_response_to(&form.saml_response);
    let cookie = state.cookies.read(&headers);
    let transition = state
        .controller
        .handle(
            cookie,
            FlowRequest::SamlCallback {
                saml_response: form.saml_response,
                in_response_to,
            },
            now_millis(),
        )
        .await;
    respond::transition(&state, transition, true)
}
