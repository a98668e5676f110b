//! Image references and selectors.
//!
//! An `ImageId` is a parsed `[host/]repository[:tag]` reference. Parsing
//! is lenient: the host and tag are optional, and no defaults are filled
//! in — what you parse is what you get back out.
//!
//! Two images are the same *lineage* when their `repository()` strings
//! match; only a tag change within one lineage constitutes a regrade.

use serde::{Deserialize, Serialize};

use crate::IdError;

/// A container image reference: optional registry host, repository path,
/// optional tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId {
    host: Option<String>,
    repository: String,
    tag: Option<String>,
}

impl ImageId {
    /// Builds an image id from its components.
    pub fn new(
        host: Option<impl Into<String>>,
        repository: impl Into<String>,
        tag: Option<impl Into<String>>,
    ) -> Self {
        Self {
            host: host.map(Into::into),
            repository: repository.into(),
            tag: tag.map(Into::into),
        }
    }

    /// Parses a `[host/]repository[:tag]` reference.
    ///
    /// The first path segment is treated as a registry host when it
    /// contains a dot or a port, or is `localhost`. A trailing
    /// `:something` is a tag unless it is part of a host port.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let (name_part, tag) = match s.rsplit_once(':') {
            // A colon followed by a slash is a host port, not a tag.
            Some((name, candidate)) if !candidate.contains('/') => {
                (name, Some(candidate.to_string()))
            }
            _ => (s, None),
        };

        let (host, repository) = match name_part.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, name_part.to_string()),
        };

        if repository.is_empty() {
            return Err(IdError::InvalidImageRef {
                reference: s.to_string(),
                message: "empty repository".to_string(),
            });
        }

        Ok(Self {
            host,
            repository,
            tag,
        })
    }

    /// The registry host, if one was given.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The tag, if one was given.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The image lineage: host (when present) plus repository, without
    /// the tag. This is the key used to decide whether two references
    /// name the same image.
    pub fn repository(&self) -> String {
        match &self.host {
            Some(host) => format!("{}/{}", host, self.repository),
            None => self.repository.clone(),
        }
    }

    /// Returns the same reference with a different tag.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            host: self.host.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.into()),
        }
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "{}/", host)?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ImageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The literal that selects the newest image in each lineage.
pub const IMAGE_SPEC_LATEST: &str = "<latest>";

/// The literal that requests a release without an image change.
pub const IMAGE_SPEC_NONE: &str = "<none>";

/// An image selector: the newest image, no image change, or one specific
/// image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ImageSpec {
    /// The most recently created image of each affected lineage.
    Latest,
    /// Release the checked-in definitions as they are.
    NoChange,
    /// One specific image.
    Id(ImageId),
}

impl ImageSpec {
    /// Parses a selector: `<latest>`, `<none>`, or an image reference.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        match s {
            IMAGE_SPEC_LATEST => Ok(Self::Latest),
            IMAGE_SPEC_NONE => Ok(Self::NoChange),
            _ => ImageId::parse(s).map(Self::Id),
        }
    }
}

impl std::fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => f.write_str(IMAGE_SPEC_LATEST),
            Self::NoChange => f.write_str(IMAGE_SPEC_NONE),
            Self::Id(id) => id.fmt(f),
        }
    }
}

impl std::str::FromStr for ImageSpec {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ImageSpec> for String {
    fn from(spec: ImageSpec) -> Self {
        spec.to_string()
    }
}

impl TryFrom<String> for ImageSpec {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}
