//! Namespaced dimension identifiers and their filesystem-safe names.
//!
//! A dimension is written `namespace:path`, e.g. `minecraft:overworld`.
//! On disk the separator becomes `$` and any `/` inside the path becomes
//! `+`. Neither character is allowed by the identifier grammar, so the
//! mapping is injective and folder names decode back unambiguously.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace used when an identifier is written without one.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

const FS_SEPARATOR: char = '$';
const FS_PATH_SLASH: char = '+';

/// A namespaced dimension identifier (`namespace:path`).
///
/// Equality and hashing are structural over both parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DimensionId {
    namespace: String,
    path: String,
}

impl DimensionId {
    /// Creates a dimension identifier from its two parts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDimension`] if either part is empty or
    /// contains characters outside the identifier grammar.
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> CoreResult<Self> {
        let namespace = namespace.into();
        let path = path.into();

        if !is_valid_namespace(&namespace) || !is_valid_path(&path) {
            return Err(CoreError::invalid_dimension(format!("{namespace}:{path}")));
        }

        Ok(Self { namespace, path })
    }

    /// Shorthand for a dimension in the default namespace.
    pub fn minecraft(path: impl Into<String>) -> CoreResult<Self> {
        Self::new(DEFAULT_NAMESPACE, path)
    }

    /// Parses `namespace:path`, or a bare `path` in the default namespace.
    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, value),
        }
    }

    /// Returns the namespace part.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the path part.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the filesystem-safe folder name for this dimension.
    ///
    /// `minecraft:overworld` becomes `minecraft$overworld`.
    pub fn to_fs_name(&self) -> String {
        let path: String = self
            .path
            .chars()
            .map(|c| if c == '/' { FS_PATH_SLASH } else { c })
            .collect();
        format!("{}{FS_SEPARATOR}{path}", self.namespace)
    }

    /// Decodes a folder name produced by [`DimensionId::to_fs_name`].
    ///
    /// A name without `$` is read as a dimension in the default namespace,
    /// unless it contains `:`, `/` or `\`. Returns `None` for anything that
    /// does not decode to a valid identifier.
    pub fn from_fs_name(name: &str) -> Option<Self> {
        if name.is_empty() {
            return None;
        }

        let (namespace, raw_path) = match name.split_once(FS_SEPARATOR) {
            Some((namespace, path)) => (namespace, path),
            None => {
                if name.contains([':', '/', '\\']) {
                    return None;
                }
                (DEFAULT_NAMESPACE, name)
            }
        };

        let path: String = raw_path
            .chars()
            .map(|c| if c == FS_PATH_SLASH { '/' } else { c })
            .collect();

        Self::new(namespace, path).ok()
    }

    /// Returns true if `name` is a folder name that decodes to a dimension.
    pub fn is_valid_fs_name(name: &str) -> bool {
        Self::from_fs_name(name).is_some()
    }
}

fn is_valid_namespace(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-'))
}

fn is_valid_path(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'/'))
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for DimensionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DimensionId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DimensionId> for String {
    fn from(value: DimensionId) -> Self {
        value.to_string()
    }
}
