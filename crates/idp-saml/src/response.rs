//! SAML Response construction.
//!
//! Builds `<samlp:Response>` documents carrying one bearer assertion, or a
//! bare status for protocol-level failures, and signs them as configured.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::identity::{Identity, Principal};
use crate::signature::XmlSigner;
use crate::types::{
    Assertion, Attribute, AuthnStatement, Conditions, NameId, ResponseArgs, Status, Subject,
    SubjectConfirmationData, ATTRNAME_FORMAT_BASIC, CM_BEARER, SAMLP_NS, SAML_NS, XSI_NS, XS_NS,
};
use crate::xml::{Element, XmlAttribute};

/// Default assertion lifetime.
pub const DEFAULT_VALIDITY: Duration = Duration::minutes(5);

/// Default allowance for SP clocks running behind.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(60);

/// `name_id_field` value selecting the principal's username.
pub const NAME_ID_FIELD_USERNAME: &str = "username";

/// Which parts of the response get an enveloped signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignFlags {
    /// Sign the `<samlp:Response>`.
    pub sign_response: bool,
    /// Sign the `<saml:Assertion>`.
    pub sign_assertion: bool,
}

impl SignFlags {
    /// Whether any signature is requested.
    #[must_use]
    pub const fn any(self) -> bool {
        self.sign_response || self.sign_assertion
    }
}

/// Resolves the NameID of `principal`.
///
/// `name_id_field` of `"username"` selects the username, any other value
/// names a principal attribute, and `None` selects the numeric ID.
/// `sp_name_qualifier` is the destination the response is sent to.
///
/// # Errors
///
/// Returns [`SamlError::ResponseConstructionError`] if the named attribute
/// is not available.
pub fn resolve_name_id(
    principal: &dyn Principal,
    name_id_field: Option<&str>,
    format: &str,
    sp_name_qualifier: &str,
) -> SamlResult<NameId> {
    let value = match name_id_field {
        None => principal.id().to_string(),
        Some(NAME_ID_FIELD_USERNAME) => principal.username().to_string(),
        Some(field) => principal
            .lookup(field)
            .map(|v| v.normalize().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SamlError::ResponseConstructionError(format!(
                    "principal has no '{field}' attribute for the NameID"
                ))
            })?,
    };
    Ok(NameId::new(value, format).with_sp_name_qualifier(sp_name_qualifier))
}

/// Builds SAML responses for one IdP.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    issuer: String,
    signer: Option<XmlSigner>,
    validity: Duration,
    clock_skew: Duration,
}

impl ResponseBuilder {
    /// Creates a builder issuing as `issuer`, without a signer.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            signer: None,
            validity: DEFAULT_VALIDITY,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Sets the signer.
    #[must_use]
    pub fn with_signer(mut self, signer: XmlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sets the assertion lifetime.
    #[must_use]
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Sets the clock skew subtracted from `NotBefore`.
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Returns the signer, if any.
    #[must_use]
    pub fn signer(&self) -> Option<&XmlSigner> {
        self.signer.as_ref()
    }

    /// Builds the assertion model for a successful login.
    #[must_use]
    pub fn build_assertion(
        &self,
        identity: &Identity,
        name_id: NameId,
        authn_context: &str,
        args: &ResponseArgs,
        now: DateTime<Utc>,
    ) -> Assertion {
        Assertion {
            id: idp_crypto::generate_saml_id(),
            issue_instant: now,
            issuer: self.issuer.clone(),
            subject: Subject {
                name_id,
                confirmation: SubjectConfirmationData {
                    recipient: args.destination.clone(),
                    in_response_to: args.in_response_to.clone(),
                    not_on_or_after: now + self.validity,
                },
            },
            conditions: Conditions::new(&args.sp_entity_id, now, self.clock_skew, self.validity),
            authn_statement: AuthnStatement {
                authn_instant: now,
                session_index: idp_crypto::generate_session_index(),
                class_ref: authn_context.to_string(),
            },
            attributes: Attribute::from_identity(identity),
        }
    }

    /// Builds and signs a successful authentication response.
    ///
    /// With both flags set the assertion is signed first, then the
    /// response envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ResponseConstructionError`] when a signature is
    /// requested but no signer is configured, or signing fails. No unsigned
    /// document is returned in that case.
    pub fn build_authn_response(
        &self,
        identity: &Identity,
        principal_id: &str,
        name_id: NameId,
        authn_context: &str,
        args: &ResponseArgs,
        sign: SignFlags,
    ) -> SamlResult<String> {
        let signer = self.signer_for(sign)?;
        let now = Utc::now();
        let assertion = self.build_assertion(identity, name_id, authn_context, args, now);
        let assertion_id = assertion.id.clone();

        let response_id = idp_crypto::generate_saml_id();
        let mut root = self.response_element(&response_id, args, &args.destination, now);
        root.push(status_element(&Status::success()));
        root.push(assertion_element(&assertion));

        if let Some(signer) = signer {
            if sign.sign_assertion {
                signer.sign_element(&mut root, &assertion_id)?;
            }
            if sign.sign_response {
                signer.sign_element(&mut root, &response_id)?;
            }
        }

        tracing::info!(
            sp = %args.sp_entity_id,
            principal = %principal_id,
            in_response_to = %args.in_response_to,
            response_id = %response_id,
            "issued authentication response"
        );
        Ok(root.to_xml())
    }

    /// Builds a response with a non-success status and no assertion.
    ///
    /// # Errors
    ///
    /// See [`ResponseBuilder::build_authn_response`].
    pub fn build_error_response(
        &self,
        args: &ResponseArgs,
        status: &Status,
        sign: SignFlags,
    ) -> SamlResult<String> {
        let signer = self.signer_for(SignFlags {
            sign_assertion: false,
            ..sign
        })?;
        let response_id = idp_crypto::generate_saml_id();
        let mut root = self.response_element(&response_id, args, &args.destination, Utc::now());
        root.push(status_element(status));

        if let Some(signer) = signer {
            if sign.sign_response {
                signer.sign_element(&mut root, &response_id)?;
            }
        }

        tracing::info!(
            sp = %args.sp_entity_id,
            in_response_to = %args.in_response_to,
            status = %status.sub_code.as_deref().unwrap_or(&status.code),
            "issued error response"
        );
        Ok(root.to_xml())
    }

    fn signer_for(&self, sign: SignFlags) -> SamlResult<Option<&XmlSigner>> {
        match (&self.signer, sign.any()) {
            (_, false) => Ok(None),
            (Some(signer), true) => Ok(Some(signer)),
            (None, true) => Err(SamlError::ResponseConstructionError(
                "signing requested but no signing credential is configured".to_string(),
            )),
        }
    }

    fn response_element(
        &self,
        id: &str,
        args: &ResponseArgs,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Element {
        let mut root = samlp("Response");
        root.declare(Some("samlp"), SAMLP_NS);
        root.declare(Some("saml"), SAML_NS);
        root.set_attr("ID", id);
        root.set_attr("Version", "2.0");
        root.set_attr("IssueInstant", instant(now));
        root.set_attr("Destination", destination);
        root.set_attr("InResponseTo", &args.in_response_to);
        root.push(issuer_element(&self.issuer));
        root
    }
}

fn samlp(local_name: &str) -> Element {
    Element::new(Some("samlp"), local_name, Some(SAMLP_NS))
}

fn saml(local_name: &str) -> Element {
    Element::new(Some("saml"), local_name, Some(SAML_NS))
}

fn text_element(local_name: &str, text: &str) -> Element {
    let mut el = saml(local_name);
    el.push_text(text);
    el
}

fn instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn issuer_element(issuer: &str) -> Element {
    text_element("Issuer", issuer)
}

fn status_element(status: &Status) -> Element {
    let mut code = samlp("StatusCode");
    code.set_attr("Value", &status.code);
    if let Some(sub) = &status.sub_code {
        let mut sub_code = samlp("StatusCode");
        sub_code.set_attr("Value", sub);
        code.push(sub_code);
    }

    let mut el = samlp("Status");
    el.push(code);
    if let Some(message) = &status.message {
        let mut msg = samlp("StatusMessage");
        msg.push_text(message);
        el.push(msg);
    }
    el
}

/// Renders an assertion model.
#[must_use]
pub fn assertion_element(assertion: &Assertion) -> Element {
    let mut el = saml("Assertion");
    el.declare(Some("saml"), SAML_NS);
    el.declare(Some("xs"), XS_NS);
    el.declare(Some("xsi"), XSI_NS);
    el.set_attr("ID", &assertion.id);
    el.set_attr("Version", "2.0");
    el.set_attr("IssueInstant", instant(assertion.issue_instant));
    el.push(issuer_element(&assertion.issuer));
    el.push(subject_element(&assertion.subject));
    el.push(conditions_element(&assertion.conditions));
    el.push(authn_statement_element(&assertion.authn_statement));
    if !assertion.attributes.is_empty() {
        let mut statement = saml("AttributeStatement");
        for attribute in &assertion.attributes {
            statement.push(attribute_element(attribute));
        }
        el.push(statement);
    }
    el
}

fn subject_element(subject: &Subject) -> Element {
    let name_id = &subject.name_id;
    let mut name_id_el = saml("NameID");
    name_id_el.set_attr("Format", &name_id.format);
    if let Some(q) = &name_id.sp_name_qualifier {
        name_id_el.set_attr("SPNameQualifier", q);
    }
    if let Some(q) = &name_id.name_qualifier {
        name_id_el.set_attr("NameQualifier", q);
    }
    name_id_el.push_text(&name_id.value);

    let data = &subject.confirmation;
    let mut data_el = saml("SubjectConfirmationData");
    data_el.set_attr("InResponseTo", &data.in_response_to);
    data_el.set_attr("NotOnOrAfter", instant(data.not_on_or_after));
    data_el.set_attr("Recipient", &data.recipient);

    let mut confirmation = saml("SubjectConfirmation");
    confirmation.set_attr("Method", CM_BEARER);
    confirmation.push(data_el);

    let mut el = saml("Subject");
    el.push(name_id_el);
    el.push(confirmation);
    el
}

fn conditions_element(conditions: &Conditions) -> Element {
    let mut restriction = saml("AudienceRestriction");
    restriction.push(text_element("Audience", &conditions.audience));

    let mut el = saml("Conditions");
    el.set_attr("NotBefore", instant(conditions.not_before));
    el.set_attr("NotOnOrAfter", instant(conditions.not_on_or_after));
    el.push(restriction);
    el
}

fn authn_statement_element(statement: &AuthnStatement) -> Element {
    let mut context = saml("AuthnContext");
    context.push(text_element("AuthnContextClassRef", &statement.class_ref));

    let mut el = saml("AuthnStatement");
    el.set_attr("AuthnInstant", instant(statement.authn_instant));
    el.set_attr("SessionIndex", &statement.session_index);
    el.push(context);
    el
}

fn attribute_element(attribute: &Attribute) -> Element {
    let mut el = saml("Attribute");
    el.set_attr("Name", &attribute.name);
    el.set_attr("NameFormat", ATTRNAME_FORMAT_BASIC);
    for value in &attribute.values {
        let mut value_el = saml("AttributeValue");
        value_el.attributes.push(XmlAttribute {
            prefix: Some("xsi".to_string()),
            local_name: "type".to_string(),
            namespace: Some(XSI_NS.to_string()),
            value: value.xsi_type().to_string(),
        });
        value_el.push_text(value.text());
        el.push(value_el);
    }
    el
}
