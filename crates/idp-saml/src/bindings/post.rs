//! HTTP-POST Binding implementation.
//!
//! Messages are base64-encoded and delivered through an auto-submitting
//! HTML form.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

use super::redirect::{deflate_decompress, InflateError};
use super::{strip_whitespace, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64-encodes `xml` without compression.
    #[must_use]
    pub fn encode_message(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    /// Decodes a POST payload.
    ///
    /// Some senders deflate POST payloads the way the redirect binding
    /// does, so inflating is tried first. When that does not yield XML
    /// text the base64-decoded bytes are used as they are.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedBinding`] on bad base64, when the
    /// payload inflates past [`MAX_INFLATED_SIZE`](super::MAX_INFLATED_SIZE)
    /// or when it is neither deflated nor plain UTF-8 text.
    pub fn decode_message(encoded: &str) -> SamlResult<String> {
        let compact = strip_whitespace(encoded);
        let raw = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;

        if let Some(xml) = inflate_to_xml(&raw)? {
            tracing::debug!("POST payload was deflated");
            return Ok(xml);
        }

        String::from_utf8(raw)
            .map_err(|e| SamlError::MalformedBinding(format!("invalid UTF-8 in message: {e}")))
    }

    /// Renders the auto-submitting form carrying the message.
    ///
    /// The destination and relay state are HTML-escaped. An empty relay
    /// state is still echoed as an empty field.
    #[must_use]
    pub fn encode_form(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let encoded = Self::encode_message(xml);

        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Continue to service</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(destination),
            message_type.form_param(),
            encoded,
            relay_state_input
        )
    }
}

fn inflate_to_xml(raw: &[u8]) -> SamlResult<Option<String>> {
    let inflated = match deflate_decompress(raw) {
        Ok(inflated) => inflated,
        Err(InflateError::Corrupt(_)) => return Ok(None),
        Err(err @ InflateError::TooLarge) => return Err(err.into()),
    };
    Ok(String::from_utf8(inflated)
        .ok()
        .filter(|text| text.trim_start().starts_with('<')))
}

/// Escapes HTML special characters.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
