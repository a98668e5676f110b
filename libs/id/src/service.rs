//! Service references and selectors.
//!
//! A `ServiceId` names one service as `namespace/name`. A `ServiceSpec`
//! is what users pass to selection operations: either the literal `<all>`
//! or a single `ServiceId`.

use serde::{Deserialize, Serialize};

use crate::IdError;

/// A reference to one service: a `(namespace, name)` pair with the
/// canonical form `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId {
    namespace: String,
    name: String,
}

impl ServiceId {
    /// Builds a service id from its components.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses a `namespace/name` reference.
    ///
    /// Both components must be present and non-empty, and the name must
    /// not itself contain a slash.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(IdError::InvalidServiceRef {
                reference: s.to_string(),
            }),
        }
    }

    /// The namespace component.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Both components, namespace first.
    pub fn components(&self) -> (&str, &str) {
        (&self.namespace, &self.name)
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for ServiceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ServiceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ServiceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The literal that selects every service in every namespace.
pub const SERVICE_SPEC_ALL: &str = "<all>";

/// A service selector: either every service, or one named service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ServiceSpec {
    /// All services in every namespace.
    All,
    /// One service.
    Id(ServiceId),
}

impl ServiceSpec {
    /// Parses a selector: the literal `<all>`, or `namespace/name`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s == SERVICE_SPEC_ALL {
            return Ok(Self::All);
        }
        ServiceId::parse(s).map(Self::Id)
    }
}

impl std::fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str(SERVICE_SPEC_ALL),
            Self::Id(id) => id.fmt(f),
        }
    }
}

impl std::str::FromStr for ServiceSpec {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ServiceSpec> for String {
    fn from(spec: ServiceSpec) -> Self {
        spec.to_string()
    }
}

impl TryFrom<String> for ServiceSpec {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}
