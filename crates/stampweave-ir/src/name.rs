//! Fully-qualified names
//!
//! Provides [`FullName`], the dotted name used to identify types across
//! module boundaries (`SQLite.ColumnAttribute`, `System.DateTimeOffset`).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Dotted, hierarchical type name
///
/// The last segment is the simple type name, the preceding segments form the
/// namespace.
///
/// # Examples
/// - `["System", "String"]` → `System.String`
/// - `["SQLite", "IgnoreAttribute"]` → `SQLite.IgnoreAttribute`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FullName(Vec<String>);

impl FullName {
    /// Create name from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Name without namespace
    #[inline]
    #[must_use]
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Build from a namespace string and a simple name
    ///
    /// # Errors
    /// Returns error if the namespace or name contains invalid segments
    pub fn from_parts(namespace: &str, name: &str) -> Result<Self, NameError> {
        let mut full: Self = namespace.parse()?;
        validate_segment(name)?;
        full.0.push(name.to_string());
        Ok(full)
    }

    /// Path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Check if the name is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Simple name (last segment)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Namespace part, dotted (`""` for the global namespace)
    #[must_use]
    pub fn namespace(&self) -> String {
        match self.0.split_last() {
            Some((_, ns)) => ns.join("."),
            None => String::new(),
        }
    }

    /// Enclosing namespace as a name (if any)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() < 2 {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Append a segment, returning new name
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Check whether this name lives inside `namespace`
    #[inline]
    #[must_use]
    pub fn is_in_namespace(&self, namespace: &Self) -> bool {
        self.0.len() > namespace.0.len() && self.0[..namespace.0.len()] == namespace.0[..]
    }
}

fn validate_segment(seg: &str) -> Result<(), NameError> {
    if seg.is_empty() {
        Err(NameError::EmptySegment)
    } else if seg.contains(|c: char| !c.is_alphanumeric() && c != '_' && c != '`') {
        Err(NameError::InvalidSegment(seg.to_string()))
    } else {
        Ok(())
    }
}

impl Display for FullName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for FullName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self(Vec::new()));
        }

        let segments: Vec<String> = s
            .split('.')
            .map(|seg| validate_segment(seg).map(|()| seg.to_string()))
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

impl From<FullName> for String {
    fn from(name: FullName) -> Self {
        name.to_string()
    }
}

impl TryFrom<String> for FullName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for FullName {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Errors related to fully-qualified names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Empty segment in name
    #[error("name contains empty segment")]
    EmptySegment,

    /// Invalid segment characters
    #[error("invalid name segment: {0} (must be alphanumeric, underscore or backtick)")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_namespace() {
        let name: FullName = "SQLite.Net.DateTimeOffset.Attributes.DateTimeOffsetSerializeAttribute"
            .parse()
            .unwrap();
        assert_eq!(name.name(), "DateTimeOffsetSerializeAttribute");
        assert_eq!(name.namespace(), "SQLite.Net.DateTimeOffset.Attributes");
    }

    #[test]
    fn global_namespace() {
        let name = FullName::single("Widget");
        assert_eq!(name.namespace(), "");
        assert!(name.parent().is_none());
    }

    #[test]
    fn from_parts_joins_namespace() {
        let name = FullName::from_parts("System.Globalization", "CultureInfo").unwrap();
        assert_eq!(name.to_string(), "System.Globalization.CultureInfo");
        assert_eq!(name.parent().unwrap().to_string(), "System.Globalization");
    }

    #[test]
    fn namespace_membership() {
        let system: FullName = "System".parse().unwrap();
        let string: FullName = "System.String".parse().unwrap();
        assert!(string.is_in_namespace(&system));
        assert!(!system.is_in_namespace(&system));
    }

    #[test]
    fn generic_arity_marker_is_accepted() {
        let name: FullName = "System.Collections.Generic.List`1".parse().unwrap();
        assert_eq!(name.name(), "List`1");
    }

    #[test]
    fn rejects_empty_segment() {
        let result: Result<FullName, _> = "System..String".parse();
        assert_eq!(result, Err(NameError::EmptySegment));
    }

    #[test]
    fn rejects_invalid_characters() {
        let result: Result<FullName, _> = "System.Str-ing".parse();
        assert!(matches!(result, Err(NameError::InvalidSegment(_))));
    }

    #[test]
    fn child_appends_segment() {
        let ns: FullName = "SQLite".parse().unwrap();
        assert_eq!(ns.child("ColumnAttribute").to_string(), "SQLite.ColumnAttribute");
    }
}
