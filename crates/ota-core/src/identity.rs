//! # Identifier Newtypes
//!
//! Newtype wrappers for the two identifiers that address the public
//! distribution tree: `{public}/{AppId}/{VersionName}/`.
//!
//! ## Security Invariant
//!
//! Both types are path components. Their constructors reject separators,
//! parent references, and leading dots, so a validated identifier can be
//! joined onto a directory without escaping it and never collides with the
//! hidden bookkeeping entries (`.latest`, `.swap`) kept next to versions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const APP_ID_MAX_LEN: usize = 64;
const VERSION_NAME_MAX_LEN: usize = 128;

fn check_length(kind: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { kind });
    }
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { kind, len, max });
    }
    Ok(())
}

/// Identity of a registered application.
///
/// 1–64 characters of `[A-Za-z0-9_-]`, starting with an alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Validate and wrap an application identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        const KIND: &str = "app id";
        let value = value.into();
        check_length(KIND, &value, APP_ID_MAX_LEN)?;
        let mut chars = value.chars();
        if let Some(first) = chars.next() {
            if !first.is_ascii_alphanumeric() {
                return Err(ValidationError::InvalidCharacter { kind: KIND, ch: first });
            }
        }
        if let Some(ch) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
            return Err(ValidationError::InvalidCharacter { kind: KIND, ch });
        }
        Ok(Self(value))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name of one uploaded version of an application.
///
/// Version names are free-form labels: they carry no ordering and need not be
/// semantic versions. They are restricted to 1–128 characters of
/// `[A-Za-z0-9._+~-]` so that they are safe as both a directory name and a
/// URL path segment, and may not begin with a dot.
///
/// The restriction is deliberate and narrower than arbitrary text: names
/// with spaces or non-ASCII characters cannot be published. A client that
/// reports such a name in an update check is treated as an unknown version
/// and is offered the full bundle of the latest version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionName(String);

impl VersionName {
    /// Validate and wrap a version name.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        const KIND: &str = "version name";
        let value = value.into();
        check_length(KIND, &value, VERSION_NAME_MAX_LEN)?;
        if value.starts_with('.') {
            return Err(ValidationError::Reserved { kind: KIND, value });
        }
        if let Some(ch) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '~' | '-')))
        {
            return Err(ValidationError::InvalidCharacter { kind: KIND, ch });
        }
        Ok(Self(value))
    }

    /// The version name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl PartialEq<str> for $ty {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $ty {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_newtype_impls!(AppId);
string_newtype_impls!(VersionName);
