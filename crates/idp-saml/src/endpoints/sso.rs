//! Single Sign-On endpoints.
//!
//! `sso_redirect`/`sso_post` receive the `AuthnRequest` and park it in the
//! browser's session. `login_process` picks it up once the user is logged
//! in, runs it through the [`IdentityProvider`](crate::idp::IdentityProvider)
//! and sends the response back to the SP.

use axum::{
    extract::{Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;

use crate::bindings::{html_escape, OutboundMessage};
use crate::error::{SamlError, SamlResult};
use crate::request::DetachedSignature;
use crate::types::SamlBinding;

use super::state::{
    session_cookie, session_id, PendingRequest, PrincipalResolver, SamlState, SessionStore,
};

/// Path of the login continuation below the SSO path.
pub const LOGIN_PROCESS_SUFFIX: &str = "/login";

/// `SAMLRequest` parameters, from the query string or the form body.
#[derive(Debug, Default, Deserialize)]
pub struct SsoParams {
    /// The encoded request.
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,

    /// Relay state.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,

    /// Signature algorithm (HTTP-Redirect only).
    #[serde(rename = "SigAlg")]
    pub sig_alg: Option<String>,

    /// Detached signature (HTTP-Redirect only).
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

/// GET handler for the SSO endpoint (HTTP-Redirect binding).
pub async fn sso_redirect<S: SessionStore, P: PrincipalResolver>(
    State(state): State<SamlState<S, P>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<SsoParams>,
) -> Response {
    let detached = detached_signature(raw_query.as_deref(), &params);
    match store_request(&state, &headers, params, SamlBinding::HttpRedirect, detached).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

/// POST handler for the SSO endpoint (HTTP-POST binding).
///
/// POSTed requests carry their signature inside the XML, so `SigAlg` and
/// `Signature` form fields are ignored.
pub async fn sso_post<S: SessionStore, P: PrincipalResolver>(
    State(state): State<SamlState<S, P>>,
    headers: HeaderMap,
    Form(params): Form<SsoParams>,
) -> Response {
    match store_request(&state, &headers, params, SamlBinding::HttpPost, None).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

/// GET handler for the login continuation.
pub async fn login_process<S: SessionStore, P: PrincipalResolver>(
    State(state): State<SamlState<S, P>>,
    headers: HeaderMap,
) -> Response {
    match process_login(&state, &headers).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

/// Prefers the raw query so the signature is checked over the exact
/// octets the SP signed.
fn detached_signature(raw_query: Option<&str>, params: &SsoParams) -> Option<DetachedSignature> {
    raw_query.and_then(DetachedSignature::from_raw_query).or_else(|| {
        match (&params.saml_request, &params.sig_alg, &params.signature) {
            (Some(request), Some(sig_alg), Some(signature)) => Some(DetachedSignature::from_decoded(
                request,
                params.relay_state.as_deref(),
                sig_alg,
                signature,
            )),
            _ => None,
        }
    })
}

async fn store_request<S: SessionStore, P: PrincipalResolver>(
    state: &SamlState<S, P>,
    headers: &HeaderMap,
    params: SsoParams,
    binding: SamlBinding,
    detached: Option<DetachedSignature>,
) -> SamlResult<Response> {
    let saml_request = params
        .saml_request
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| SamlError::InvalidRequest("SAMLRequest parameter is required".to_string()))?;

    let pending = PendingRequest {
        saml_request,
        relay_state: params.relay_state.unwrap_or_default(),
        binding,
        detached,
    };
    tracing::debug!(%binding, signed = pending.detached.is_some(), "received SAMLRequest");

    let new_session = match session_id(headers) {
        Some(id) if state.sessions.put(&id, pending.clone()).await? => None,
        _ => Some(state.sessions.create(pending).await?),
    };

    let mut response = found(&login_process_path(&state.idp.config().sso_path))?;
    if let Some(id) = new_session {
        let cookie = HeaderValue::from_str(&session_cookie(&id))
            .map_err(|e| SamlError::Internal(format!("invalid session cookie: {e}")))?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

async fn process_login<S: SessionStore, P: PrincipalResolver>(
    state: &SamlState<S, P>,
    headers: &HeaderMap,
) -> SamlResult<Response> {
    let session = session_id(headers)
        .ok_or_else(|| SamlError::InvalidRequest("no SSO session".to_string()))?;
    let pending = state
        .sessions
        .get(&session)
        .await?
        .ok_or_else(|| SamlError::InvalidRequest("no pending SAMLRequest".to_string()))?;

    let idp = &state.idp;
    let request = idp.parse_authn_request(
        &pending.saml_request,
        pending.binding,
        pending.detached.as_ref(),
    )?;

    let issued = match state.principals.resolve(headers).await? {
        Some(principal) => idp.authenticate(&request, principal.as_ref())?,
        None if request.is_passive => idp.passive_failure(&request)?,
        None => {
            let config = idp.config();
            return found(&login_redirect(&config.login_url, &config.sso_path));
        }
    };

    let outbound = idp.bind(&issued, pending.relay_state())?;
    state.sessions.remove(&session).await?;

    match outbound {
        OutboundMessage::Form { html } => Ok(Html(html).into_response()),
        OutboundMessage::Redirect { location } => found(&location),
    }
}

/// `{sso_path}/login`.
#[must_use]
pub fn login_process_path(sso_path: &str) -> String {
    format!("{}{LOGIN_PROCESS_SUFFIX}", sso_path.trim_end_matches('/'))
}

fn login_redirect(login_url: &str, sso_path: &str) -> String {
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!(
        "{login_url}{separator}next={}",
        urlencoding::encode(&login_process_path(sso_path))
    )
}

fn found(location: &str) -> SamlResult<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| SamlError::Internal(format!("invalid redirect location: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// Converts a `SamlError` to an HTML error page.
fn error_response(err: &SamlError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "SSO request failed");
    } else {
        tracing::warn!(error = %err, "SSO request rejected");
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Single Sign-On Error</title></head>
<body>
<h1>Single Sign-On Error</h1>
<p>{}</p>
</body>
</html>"#,
        html_escape(&err.to_string())
    );
    (status, Html(html)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_carries_next() {
        assert_eq!(login_redirect("/login", "/sso"), "/login?next=%2Fsso%2Flogin");
        assert_eq!(
            login_redirect("https://id.example.com/auth?app=idp", "/saml/sso/"),
            "https://id.example.com/auth?app=idp&next=%2Fsaml%2Fsso%2Flogin"
        );
    }

    #[test]
    fn detached_signature_needs_both_parameters() {
        let params = SsoParams {
            saml_request: Some("abc".to_string()),
            sig_alg: Some("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".to_string()),
            ..SsoParams::default()
        };
        assert!(detached_signature(Some("SAMLRequest=abc&SigAlg=x"), &params).is_none());
    }

    #[test]
    fn detached_signature_prefers_raw_query() {
        let params = SsoParams::default();
        let detached = detached_signature(
            Some("SAMLRequest=a%2Bb&RelayState=rs&SigAlg=alg&Signature=c2ln"),
            &params,
        )
        .unwrap();
        assert_eq!(detached.signed_query, "SAMLRequest=a%2Bb&RelayState=rs&SigAlg=alg");
        assert_eq!(detached.signature, "c2ln");
    }

    #[test]
    fn error_page_status_follows_error() {
        let response = error_response(&SamlError::InvalidRequest("<script>".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
