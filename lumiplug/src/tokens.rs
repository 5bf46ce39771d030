//! Names used on the wire: packages, type tokens and URNs
//!
//! A type token has three `:`-separated components, `package:module:member`,
//! for example `aws:ec2/securityGroup:SecurityGroup`. The package selects the
//! plugin that manages the type; module paths and packages may be nested with
//! the `/` delimiter.

use crate::error::{LumiplugError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Delimiter between nested names inside a package or module path
pub const QNAME_DELIMITER: &str = "/";

/// Delimiter between the components of a type token
pub const TOKEN_DELIMITER: char = ':';

/// Prefix shared by every URN
pub const URN_PREFIX: &str = "urn:lumi:";

static PACKAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*(/[A-Za-z_][A-Za-z0-9_.-]*)*$").expect("valid package pattern")
});

static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z_][A-Za-z0-9_.-]*(/[A-Za-z_][A-Za-z0-9_.-]*)*:([A-Za-z0-9_.-]+(/[A-Za-z0-9_.-]+)*)?:[A-Za-z_][A-Za-z0-9_]*$",
    )
    .expect("valid type token pattern")
});

/// Package name, the unit a provider plugin is built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Package(String);

impl Package {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !PACKAGE_RE.is_match(&name) {
            return Err(LumiplugError::InvalidToken(format!(
                "'{}' is not a valid package name",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package name with namespace delimiters flattened, as used in executable names
    pub fn flattened(&self) -> String {
        self.0.replace(QNAME_DELIMITER, "_")
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Package {
    type Err = LumiplugError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Fully qualified resource type token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Type(String);

impl Type {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if !TYPE_RE.is_match(&token) {
            return Err(LumiplugError::InvalidToken(format!(
                "'{}' is not a valid type token (expected package:module:member)",
                token
            )));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> (&str, &str, &str) {
        let mut parts = self.0.splitn(3, TOKEN_DELIMITER);
        let package = parts.next().unwrap_or_default();
        let module = parts.next().unwrap_or_default();
        let member = parts.next().unwrap_or_default();
        (package, module, member)
    }

    /// The package that owns this type
    pub fn package(&self) -> Package {
        Package(self.components().0.to_string())
    }

    pub fn module(&self) -> &str {
        self.components().1
    }

    pub fn member(&self) -> &str {
        self.components().2
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Type {
    type Err = LumiplugError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Type {
    type Error = LumiplugError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Logical resource name, stable before the provider assigns an ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Urn(String);

impl Urn {
    pub fn new(urn: impl Into<String>) -> Result<Self> {
        let urn = urn.into();
        if !Self::is_urn(&urn) {
            return Err(LumiplugError::InvalidToken(format!(
                "'{}' is not a URN (expected prefix {})",
                urn, URN_PREFIX
            )));
        }
        Ok(Self(urn))
    }

    /// Whether a string looks like a URN
    pub fn is_urn(s: &str) -> bool {
        s.len() > URN_PREFIX.len() && s.starts_with(URN_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Urn {
    type Err = LumiplugError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
