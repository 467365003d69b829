//! Identity mapping.
//!
//! Turns an authenticated principal into the attribute set released to one
//! service provider. Principals expose attributes through the
//! [`AttributeSource`] capability rather than by field name, and the policy
//! applied per SP is a [`Processor`] resolved from a [`ProcessorRegistry`]
//! when the IdP starts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

/// Attribute mapping for one SP: output attribute name → source attribute.
pub type AttributeMapping = BTreeMap<String, String>;

/// Mapping used for SPs that configure none.
#[must_use]
pub fn default_mapping() -> AttributeMapping {
    BTreeMap::from([("username".to_string(), "username".to_string())])
}

/// ISO country reference as stored on user profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code.
    pub code: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// A raw attribute value held by a principal or its profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean flag.
    Boolean(bool),
    /// Integer, released as `xs:integer`.
    Integer(i64),
    /// Plain string.
    String(String),
    /// Multi-valued string attribute.
    List(Vec<String>),
    /// Structured country, released as its code.
    Country(Country),
}

impl AttributeValue {
    /// Narrows the value to what the attribute statement can carry.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Country(country) => Self::String(country.code),
            Self::Boolean(b) => Self::String(b.to_string()),
            other => other,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(",")),
            Self::Country(c) => f.write_str(&c.code),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

/// Read access to named attributes.
pub trait AttributeSource: Send + Sync {
    /// Returns the attribute, or `None` if this source does not have it.
    fn get(&self, name: &str) -> Option<AttributeValue>;
}

impl AttributeSource for BTreeMap<String, AttributeValue> {
    fn get(&self, name: &str) -> Option<AttributeValue> {
        BTreeMap::get(self, name).cloned()
    }
}

/// An authenticated user.
pub trait Principal: AttributeSource {
    /// Stable numeric identifier.
    fn id(&self) -> i64;

    /// Login name.
    fn username(&self) -> &str;

    /// Secondary attribute record owned by the principal, if any.
    fn profile(&self) -> Option<&dyn AttributeSource> {
        None
    }

    /// Looks an attribute up on the principal first, then on its profile.
    fn lookup(&self, name: &str) -> Option<AttributeValue> {
        self.get(name)
            .or_else(|| self.profile().and_then(|profile| profile.get(name)))
    }
}

/// A principal backed by plain data, as loaded from a user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Numeric identifier.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Attributes stored on the user itself.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Profile attributes, when the user has a profile.
    #[serde(default)]
    pub profile: Option<BTreeMap<String, AttributeValue>>,
}

impl UserRecord {
    /// Creates a record with no attributes and no profile.
    #[must_use]
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            attributes: BTreeMap::new(),
            profile: None,
        }
    }

    /// Adds an attribute on the user.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Adds an attribute on the profile, creating it if needed.
    #[must_use]
    pub fn with_profile_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.profile
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.into());
        self
    }
}

impl AttributeSource for UserRecord {
    fn get(&self, name: &str) -> Option<AttributeValue> {
        match name {
            "id" => Some(AttributeValue::Integer(self.id)),
            "username" => Some(AttributeValue::String(self.username.clone())),
            _ => self.attributes.get(name).cloned(),
        }
    }
}

impl Principal for UserRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn profile(&self) -> Option<&dyn AttributeSource> {
        self.profile.as_ref().map(|p| p as &dyn AttributeSource)
    }
}

/// Attributes released to one SP, keyed by output name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Identity(BTreeMap<String, AttributeValue>);

impl Identity {
    /// Creates an empty identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    pub fn insert(&mut self, name: &str, value: AttributeValue) {
        self.0.insert(name.to_string(), value);
    }

    /// Returns an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no attribute is released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Builds the identity for `mapping`.
///
/// Each source attribute is looked up on the principal, then on its
/// profile. Attributes found on neither are left out.
#[must_use]
pub fn create_identity(principal: &dyn Principal, mapping: &AttributeMapping) -> Identity {
    let mut identity = Identity::new();
    for (output, source) in mapping {
        match principal.lookup(source) {
            Some(value) => identity.insert(output, value.normalize()),
            None => tracing::debug!(attribute = %source, "attribute not available, omitted"),
        }
    }
    identity
}

/// Per-SP access policy and identity strategy.
pub trait Processor: Send + Sync + fmt::Debug {
    /// Whether the principal may log in to the SP.
    fn has_access(&self, principal: &dyn Principal) -> bool;

    /// Builds the released identity.
    fn create_identity(&self, principal: &dyn Principal, mapping: &AttributeMapping) -> Identity {
        create_identity(principal, mapping)
    }
}

/// Default processor: everyone has access, attributes are mapped as
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseProcessor;

impl Processor for BaseProcessor {
    fn has_access(&self, _principal: &dyn Principal) -> bool {
        true
    }
}

/// Key under which [`BaseProcessor`] is registered.
pub const BASE_PROCESSOR: &str = "base";

/// Named processors, filled at startup.
#[derive(Debug, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            processors: HashMap::new(),
        };
        registry.register(BASE_PROCESSOR, Arc::new(BaseProcessor));
        registry
    }
}

impl ProcessorRegistry {
    /// Creates a registry holding [`BaseProcessor`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a processor.
    pub fn register(&mut self, name: &str, processor: Arc<dyn Processor>) {
        self.processors.insert(name.to_string(), processor);
    }

    /// Resolves a configured processor name. `None` means [`BaseProcessor`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigurationError`] for unregistered names.
    pub fn resolve(&self, name: Option<&str>) -> SamlResult<Arc<dyn Processor>> {
        let name = name.unwrap_or(BASE_PROCESSOR);
        self.processors.get(name).cloned().ok_or_else(|| {
            SamlError::ConfigurationError(format!("processor '{name}' is not registered"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserRecord {
        UserRecord::new(42, "alice")
    }

    fn mapping(pairs: &[(&str, &str)]) -> AttributeMapping {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn maps_username_and_integer_id() {
        let identity = create_identity(
            &alice(),
            &mapping(&[("uid", "username"), ("employeeId", "id")]),
        );

        assert_eq!(identity.get("uid"), Some(&AttributeValue::String("alice".into())));
        assert_eq!(identity.get("employeeId"), Some(&AttributeValue::Integer(42)));
    }

    #[test]
    fn missing_attributes_are_omitted() {
        let identity = create_identity(&alice(), &mapping(&[("mail", "email"), ("uid", "username")]));
        assert!(!identity.contains("mail"));
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn profile_is_consulted_after_principal() {
        let user = alice()
            .with_attribute("email", "alice@example.com")
            .with_profile_attribute("email", "other@example.com")
            .with_profile_attribute("department", "R&D");

        let identity = create_identity(
            &user,
            &mapping(&[("mail", "email"), ("ou", "department")]),
        );
        assert_eq!(identity.get("mail").unwrap().to_string(), "alice@example.com");
        assert_eq!(identity.get("ou").unwrap().to_string(), "R&D");
    }

    #[test]
    fn country_is_released_as_code() {
        let user = alice().with_profile_attribute(
            "country",
            AttributeValue::Country(Country {
                code: "NL".to_string(),
                name: "Netherlands".to_string(),
            }),
        );
        let identity = create_identity(&user, &mapping(&[("c", "country")]));
        assert_eq!(identity.get("c"), Some(&AttributeValue::String("NL".into())));
    }

    #[test]
    fn default_mapping_releases_username() {
        let identity = create_identity(&alice(), &default_mapping());
        assert_eq!(identity.get("username").unwrap().to_string(), "alice");
    }

    #[test]
    fn user_record_from_json() {
        let user: UserRecord = serde_json::from_str(
            r#"{"id": 7, "username": "bob",
                "attributes": {"is_staff": true, "groups": ["a", "b"]},
                "profile": {"country": {"code": "DE", "name": "Germany"}}}"#,
        )
        .unwrap();

        assert_eq!(user.lookup("is_staff"), Some(AttributeValue::Boolean(true)));
        assert_eq!(
            user.lookup("groups"),
            Some(AttributeValue::List(vec!["a".into(), "b".into()]))
        );
        assert!(matches!(user.lookup("country"), Some(AttributeValue::Country(_))));
    }

    #[derive(Debug)]
    struct StaffOnly;

    impl Processor for StaffOnly {
        fn has_access(&self, principal: &dyn Principal) -> bool {
            principal.lookup("is_staff") == Some(AttributeValue::Boolean(true))
        }
    }

    #[test]
    fn registry_resolves_processors() {
        let mut registry = ProcessorRegistry::new();
        registry.register("staff", Arc::new(StaffOnly));

        assert!(registry.resolve(None).unwrap().has_access(&alice()));
        assert!(!registry.resolve(Some("staff")).unwrap().has_access(&alice()));
        assert!(matches!(
            registry.resolve(Some("missing")),
            Err(SamlError::ConfigurationError(_))
        ));
    }
}
