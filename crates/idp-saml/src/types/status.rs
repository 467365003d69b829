//! SAML `<samlp:Status>`.

use serde::Serialize;

use super::{status_codes, sub_status_codes};
use crate::error::SamlError;

/// Status carried by every `<samlp:Response>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Top-level status code URI.
    pub code: String,
    /// Optional second-level status code URI.
    pub sub_code: Option<String>,
    /// Optional human readable message.
    pub message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: status_codes::SUCCESS.to_string(),
            sub_code: None,
            message: None,
        }
    }

    /// Creates the status sent when `IsPassive` cannot be honoured.
    #[must_use]
    pub fn no_passive() -> Self {
        Self {
            code: status_codes::RESPONDER.to_string(),
            sub_code: Some(sub_status_codes::NO_PASSIVE.to_string()),
            message: None,
        }
    }

    /// Returns true if this is a success status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == status_codes::SUCCESS
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl From<&SamlError> for Status {
    fn from(err: &SamlError) -> Self {
        Self {
            code: err.status_code().to_string(),
            sub_code: err.sub_status_code().map(String::from),
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_success() {
        let status = Status::default();
        assert!(status.is_success());
        assert!(status.sub_code.is_none());
    }

    #[test]
    fn status_from_error_carries_sub_code() {
        let status = Status::from(&SamlError::UnknownPrincipal("sp".into()));
        assert!(!status.is_success());
        assert_eq!(status.code, status_codes::REQUESTER);
        assert_eq!(status.sub_code.as_deref(), Some(sub_status_codes::UNKNOWN_PRINCIPAL));
    }

    #[test]
    fn no_passive_status() {
        let status = Status::no_passive().with_message("login required");
        assert_eq!(status.sub_code.as_deref(), Some(sub_status_codes::NO_PASSIVE));
        assert_eq!(status.message.as_deref(), Some("login required"));
    }
}
