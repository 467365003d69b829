//! IdP and per-SP configuration.
//!
//! Deserialized from JSON. Relative paths are resolved against the
//! directory of the configuration file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::identity::{default_mapping, AttributeMapping};
use crate::metadata::EntityDescriptor;
use crate::request::SignaturePolicy;
use crate::response::SignFlags;
use crate::signature::{SignatureAlgorithm, SigningCredential};
use crate::types::NameIdFormat;

/// Identity provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// IdP entity ID.
    pub entity_id: String,

    /// Public base URL, e.g. `https://idp.example.com`.
    pub base_url: String,

    /// Path of the SSO endpoint below `base_url`.
    #[serde(default = "default_sso_path")]
    pub sso_path: String,

    /// Where unauthenticated users are sent; receives `?next=`.
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// PEM private key.
    pub key_file: PathBuf,

    /// PEM certificate matching `key_file`.
    pub cert_file: PathBuf,

    /// Sign the response envelope by default.
    #[serde(default)]
    pub sign_response: bool,

    /// Sign the assertion by default.
    #[serde(default = "default_true")]
    pub sign_assertion: bool,

    /// Signature algorithm for everything the IdP signs.
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,

    /// NameID formats the IdP can issue.
    #[serde(default = "default_name_id_formats")]
    pub name_id_formats: Vec<NameIdFormat>,

    /// Assertion lifetime in seconds.
    #[serde(default = "default_validity_secs")]
    pub assertion_validity_secs: i64,

    /// `WantAuthnRequestsSigned` published in metadata, and the default
    /// for SPs that do not override it.
    #[serde(default)]
    pub want_authn_requests_signed: bool,

    /// SP metadata files.
    #[serde(default)]
    pub metadata_files: Vec<PathBuf>,

    /// Per-SP settings keyed by entity ID.
    #[serde(default)]
    pub service_providers: BTreeMap<String, SpConfig>,
}

/// Settings for one service provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpConfig {
    /// Output attribute name → principal attribute.
    #[serde(default)]
    pub attribute_mapping: Option<AttributeMapping>,

    /// Registered processor key; the base processor when unset.
    #[serde(default)]
    pub processor: Option<String>,

    /// Principal field used as NameID value: `"username"`, another
    /// attribute name, or unset for the numeric ID.
    #[serde(default)]
    pub name_id_field: Option<String>,

    /// NameID format used when the request does not ask for a supported one.
    #[serde(default)]
    pub name_id_format: Option<NameIdFormat>,

    /// Overrides [`IdpConfig::sign_response`].
    #[serde(default)]
    pub sign_response: Option<bool>,

    /// Overrides [`IdpConfig::sign_assertion`].
    #[serde(default)]
    pub sign_assertion: Option<bool>,

    /// Overrides [`IdpConfig::want_authn_requests_signed`].
    #[serde(default)]
    pub want_authn_requests_signed: Option<bool>,

    /// Accept SHA-1 based request signatures.
    #[serde(default)]
    pub allow_sha1: bool,
}

impl SpConfig {
    /// The configured mapping, or `{username: username}`.
    #[must_use]
    pub fn mapping(&self) -> AttributeMapping {
        self.attribute_mapping.clone().unwrap_or_else(default_mapping)
    }
}

fn default_sso_path() -> String {
    "/sso".to_string()
}

fn default_login_url() -> String {
    "/login".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_name_id_formats() -> Vec<NameIdFormat> {
    vec![NameIdFormat::Unspecified]
}

const fn default_validity_secs() -> i64 {
    300
}

impl IdpConfig {
    /// Parses JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] for invalid JSON or values.
    pub fn from_json(json: &str) -> SamlResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SamlError::ConfigurationError(format!("invalid IdP configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if the file cannot be read
    /// or is invalid.
    pub fn from_file(path: &Path) -> SamlResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SamlError::ConfigurationError(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json(&json)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        resolve(&mut self.key_file);
        resolve(&mut self.cert_file);
        self.metadata_files.iter_mut().for_each(resolve);
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] describing the first problem.
    pub fn validate(&self) -> SamlResult<()> {
        if self.entity_id.trim().is_empty() {
            return Err(SamlError::ConfigurationError("entity_id is empty".to_string()));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            SamlError::ConfigurationError(format!("base_url '{}': {e}", self.base_url))
        })?;
        if !self.sso_path.starts_with('/') {
            return Err(SamlError::ConfigurationError("sso_path must start with '/'".to_string()));
        }
        if self.assertion_validity_secs <= 0 {
            return Err(SamlError::ConfigurationError(
                "assertion_validity_secs must be positive".to_string(),
            ));
        }
        if self.signature_algorithm.is_deprecated() {
            return Err(SamlError::ConfigurationError(
                "the IdP cannot sign with SHA-1".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute SSO URL.
    #[must_use]
    pub fn sso_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.sso_path)
    }

    /// Settings of `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if the SP has no entry.
    pub fn sp(&self, entity_id: &str) -> SamlResult<&SpConfig> {
        self.service_providers.get(entity_id).ok_or_else(|| {
            SamlError::ConfigurationError(format!("no configuration for SP {entity_id}"))
        })
    }

    /// Effective signing flags for an SP.
    #[must_use]
    pub fn sign_flags(&self, sp: &SpConfig) -> SignFlags {
        SignFlags {
            sign_response: sp.sign_response.unwrap_or(self.sign_response),
            sign_assertion: sp.sign_assertion.unwrap_or(self.sign_assertion),
        }
    }

    /// Effective request-signature policy for an SP.
    #[must_use]
    pub fn signature_policy(&self, sp: &SpConfig) -> SignaturePolicy {
        SignaturePolicy {
            want_authn_requests_signed: sp
                .want_authn_requests_signed
                .unwrap_or(self.want_authn_requests_signed),
            allow_sha1: sp.allow_sha1,
        }
    }

    /// Loads the signing key and certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] if either file is unusable.
    pub fn signing_credential(&self) -> SamlResult<SigningCredential> {
        SigningCredential::from_files(&self.key_file, &self.cert_file)
    }

    /// Parses every SP metadata file.
    ///
    /// # Errors
    ///
    /// Returns the first file's error.
    pub fn load_metadata(&self) -> SamlResult<Vec<EntityDescriptor>> {
        let mut descriptors = Vec::new();
        for path in &self.metadata_files {
            let loaded = EntityDescriptor::from_file(path)?;
            tracing::debug!(path = %path.display(), entities = loaded.len(), "read SP metadata");
            descriptors.extend(loaded);
        }
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "entity_id": "https://idp.example.com/metadata",
        "base_url": "https://idp.example.com/",
        "key_file": "idp-key.pem",
        "cert_file": "idp-cert.pem",
        "service_providers": {
            "https://sp.example.com": {
                "attribute_mapping": {"uid": "username", "employeeId": "id"},
                "name_id_field": "username",
                "sign_response": true
            },
            "https://plain.example.com": {}
        }
    }"#;

    #[test]
    fn defaults_apply() {
        let config = IdpConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.sso_url(), "https://idp.example.com/sso");
        assert!(!config.sign_response);
        assert!(config.sign_assertion);
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(config.name_id_formats, vec![NameIdFormat::Unspecified]);
        assert_eq!(config.assertion_validity_secs, 300);
    }

    #[test]
    fn sp_overrides() {
        let config = IdpConfig::from_json(MINIMAL).unwrap();
        let sp = config.sp("https://sp.example.com").unwrap();
        let flags = config.sign_flags(sp);
        assert!(flags.sign_response);
        assert!(flags.sign_assertion);
        assert_eq!(sp.mapping().get("employeeId").map(String::as_str), Some("id"));

        let plain = config.sp("https://plain.example.com").unwrap();
        assert_eq!(plain.mapping(), default_mapping());
        assert!(!config.signature_policy(plain).want_authn_requests_signed);
    }

    #[test]
    fn unknown_sp_is_a_configuration_error() {
        let config = IdpConfig::from_json(MINIMAL).unwrap();
        assert!(matches!(
            config.sp("https://unknown.example.com"),
            Err(SamlError::ConfigurationError(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_url = MINIMAL.replace("https://idp.example.com/\"", "not a url\"");
        assert!(IdpConfig::from_json(&bad_url).is_err());

        let bad_format = MINIMAL.replace(
            r#""name_id_field": "username","#,
            r#""name_id_field": "username", "name_id_format": "urn:bogus","#,
        );
        assert!(matches!(
            IdpConfig::from_json(&bad_format),
            Err(SamlError::ConfigurationError(_))
        ));

        let sha1 = MINIMAL.replace(
            r#""key_file""#,
            r#""signature_algorithm": "rsa-sha1", "key_file""#,
        );
        assert!(IdpConfig::from_json(&sha1).is_err());
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut config = IdpConfig::from_json(MINIMAL).unwrap();
        config.metadata_files.push(PathBuf::from("sp.xml"));
        config.resolve_paths(Path::new("/etc/idp"));
        assert_eq!(config.key_file, PathBuf::from("/etc/idp/idp-key.pem"));
        assert_eq!(config.metadata_files[0], PathBuf::from("/etc/idp/sp.xml"));
    }
}
