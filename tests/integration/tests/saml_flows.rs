//! SAML SSO flows against the running server.

use std::sync::Arc;

use idp_crypto::Certificate;
use idp_saml::bindings::{HttpPostBinding, HttpRedirectBinding, RedirectParams, SamlMessageType};
use idp_saml::signature::{SigningCredential, XmlSignatureValidator, XmlSigner};
use idp_saml::xml;

use crate::common::{TestEnv, SP_ACS, SP_ENTITY_ID, USER_HEADER};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../crates/idp-saml/tests/fixtures");

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("{FIXTURES}/{name}")).unwrap()
}

fn authn_request(env: &TestEnv, extra: &str) -> String {
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_abc123" Version="2.0" IssueInstant="2024-01-01T00:00:00Z" Destination="{}"{extra}><saml:Issuer>{SP_ENTITY_ID}</saml:Issuer></samlp:AuthnRequest>"#,
        env.url("/sso")
    )
}

fn form_value<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!(r#"name="{name}" value=""#);
    let start = html.find(&marker)? + marker.len();
    let end = html[start..].find('"')?;
    Some(&html[start..start + end])
}

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Tests that the IdP metadata endpoint returns valid XML.
#[tokio::test]
async fn test_metadata_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.get(env.url("/metadata")).send().await?;
    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert_eq!(content_type, "text/xml; charset=utf-8");

    let body = response.text().await?;
    let root = xml::parse(&body)?;
    assert_eq!(root.attr("entityID"), Some(env.url("/metadata").as_str()));
    assert!(body.contains("SingleSignOnService"));
    assert!(body.contains(&env.url("/sso")));
    assert!(body.contains("X509Certificate"));
    Ok(())
}

/// Tests the full signed HTTP-Redirect login ending in a signed POST response.
#[tokio::test]
async fn test_signed_redirect_login() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let sp_signer = XmlSigner::new(Arc::new(SigningCredential::from_pem(
        &fixture("sp-key.pem"),
        &fixture("sp-cert.pem"),
    )?));

    let url = HttpRedirectBinding::encode_url(
        &authn_request(&env, ""),
        &env.url("/sso"),
        Some("state-1"),
        SamlMessageType::Request,
        Some(&sp_signer),
    )?;
    let response = env.client.get(&url).send().await?;
    assert_eq!(response.status().as_u16(), 302);
    assert_eq!(location(&response), "/sso/login");

    // Not logged in yet: off to the login page.
    let response = env.client.get(env.url("/sso/login")).send().await?;
    assert_eq!(response.status().as_u16(), 302);
    assert_eq!(location(&response), "/login?next=%2Fsso%2Flogin");

    let response = env
        .client
        .get(env.url("/sso/login"))
        .header(USER_HEADER, "alice")
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await?;
    assert!(html.contains(&format!(r#"action="{SP_ACS}""#)));
    assert_eq!(form_value(&html, "RelayState"), Some("state-1"));

    let saml_response = HttpPostBinding::decode_message(form_value(&html, "SAMLResponse").unwrap())?;
    let root = xml::parse(&saml_response)?;
    assert_eq!(root.attr("InResponseTo"), Some("_abc123"));
    assert_eq!(root.attr("Destination"), Some(SP_ACS));

    let idp_cert = Certificate::from_pem(&fixture("idp-cert.pem"))?;
    XmlSignatureValidator::new(vec![idp_cert]).validate_element(&root, &root)?;

    assert!(saml_response.contains("alice@example.com"));
    assert!(saml_response.contains(r#"Name="employeeId""#));
    Ok(())
}

/// Tests that a tampered redirect signature is refused.
#[tokio::test]
async fn test_tampered_redirect_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let sp_signer = XmlSigner::new(Arc::new(SigningCredential::from_pem(
        &fixture("sp-key.pem"),
        &fixture("sp-cert.pem"),
    )?));

    let url = HttpRedirectBinding::encode_url(
        &authn_request(&env, ""),
        &env.url("/sso"),
        Some("state-1"),
        SamlMessageType::Request,
        Some(&sp_signer),
    )?
    .replace("RelayState=state-1", "RelayState=state-2");
    env.client.get(&url).send().await?;

    let response = env
        .client
        .get(env.url("/sso/login"))
        .header(USER_HEADER, "alice")
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 400);
    Ok(())
}

/// Tests that a Redirect-bound response carries a detached signature.
#[tokio::test]
async fn test_redirect_response_binding() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let url = HttpRedirectBinding::encode_url(
        &authn_request(
            &env,
            r#" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect""#,
        ),
        &env.url("/sso"),
        None,
        SamlMessageType::Request,
        None,
    )?;
    env.client.get(&url).send().await?;

    let response = env
        .client
        .get(env.url("/sso/login"))
        .header(USER_HEADER, "alice")
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 302);

    let target = location(&response);
    assert!(target.starts_with(&format!("{SP_ACS}/redirect?SAMLResponse=")));
    let params = RedirectParams::from_url(&target)?;
    assert!(params.signature.is_some());

    let idp_cert = Certificate::from_pem(&fixture("idp-cert.pem"))?;
    XmlSignatureValidator::new(vec![idp_cert]).validate_redirect_binding(
        &params.signed_query().unwrap(),
        params.signature.as_deref().unwrap(),
        params.sig_alg.as_deref().unwrap(),
    )?;
    assert!(params.decode()?.contains(r#"InResponseTo="_abc123""#));
    Ok(())
}

/// Tests that an undecodable request produces an error page.
#[tokio::test]
async fn test_garbage_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.get(env.url("/sso?SAMLRequest=%21%21%21")).send().await?;
    assert_eq!(response.status().as_u16(), 302);

    let response = env
        .client
        .get(env.url("/sso/login"))
        .header(USER_HEADER, "alice")
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 400);
    assert!(response.text().await?.contains("Single Sign-On Error"));

    let response = env.client.get(env.url("/sso")).send().await?;
    assert_eq!(response.status().as_u16(), 400);
    Ok(())
}
