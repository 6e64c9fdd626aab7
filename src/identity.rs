//! Component identities
//!
//! A component is identified by its name, version, culture and public key
//! token. Dropping the version gives the *unversioned* identity, which is the
//! key of a reconciliation group: every component sharing it is a candidate
//! for the same binding redirect.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Culture used when a name does not declare one
pub const NEUTRAL_CULTURE: &str = "neutral";

/// Rendering of an absent public key token
pub const NULL_TOKEN: &str = "null";

/// Errors raised while building an identity from text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Component name cannot be empty")]
    EmptyName,

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid public key token '{0}'")]
    InvalidPublicKeyToken(String),

    #[error("Malformed symbolic name '{0}'")]
    Malformed(String),
}

// ============================================================================
// Version
// ============================================================================

/// Four-part component version (`major.minor.build.revision`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl Version {
    /// `0.0.0.0`, the lower bound of every redirect range
    pub const ZERO: Version = Version::new(0, 0, 0, 0);

    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for Version {
    type Err = IdentityError;

    /// Parses one to four dot-separated parts; missing parts are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdentityError::InvalidVersion(s.to_string());
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid());
        }

        let mut numbers = [0u32; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.trim().parse().map_err(|_| invalid())?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2], numbers[3]))
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl TryFrom<String> for Version {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Unversioned identity
// ============================================================================

/// Name, culture and public key token of a component
///
/// Name and culture compare ordinal-ignore-case; the token is kept as
/// lower-case hex and compares exactly.
#[derive(Debug, Clone, Serialize)]
pub struct UnversionedIdentity {
    name: String,
    public_key_token: Option<String>,
    culture: String,
}

impl UnversionedIdentity {
    /// Build an identity from its textual parts.
    ///
    /// A token of `null` (any case) or an empty token means "no token"; an
    /// empty culture means [`NEUTRAL_CULTURE`].
    pub fn new(
        name: &str,
        public_key_token: Option<&str>,
        culture: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }

        let public_key_token = match public_key_token.map(str::trim) {
            None | Some("") => None,
            Some(token) if token.eq_ignore_ascii_case(NULL_TOKEN) => None,
            Some(token) => {
                let is_hex = token.len() % 2 == 0 && token.chars().all(|c| c.is_ascii_hexdigit());
                if !is_hex {
                    return Err(IdentityError::InvalidPublicKeyToken(token.to_string()));
                }
                Some(token.to_ascii_lowercase())
            }
        };

        let culture = match culture.map(str::trim) {
            None | Some("") => NEUTRAL_CULTURE.to_string(),
            Some(culture) => culture.to_string(),
        };

        Ok(Self {
            name: name.to_string(),
            public_key_token,
            culture,
        })
    }

    /// Build an identity from raw public key token bytes.
    pub fn with_token_bytes(
        name: &str,
        token: &[u8],
        culture: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let hex: String = token.iter().map(|b| format!("{:02x}", b)).collect();
        Self::new(name, Some(&hex), culture)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn culture(&self) -> &str {
        &self.culture
    }

    pub fn public_key_token(&self) -> Option<&str> {
        self.public_key_token.as_deref()
    }

    /// Token as rendered in redirect syntax: hex, or `null`
    pub fn token_str(&self) -> &str {
        self.public_key_token.as_deref().unwrap_or(NULL_TOKEN)
    }

    fn folded(&self) -> (String, String, &str) {
        (
            self.name.to_ascii_lowercase(),
            self.culture.to_ascii_lowercase(),
            self.token_str(),
        )
    }
}

impl PartialEq for UnversionedIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.culture.eq_ignore_ascii_case(&other.culture)
            && self.public_key_token == other.public_key_token
    }
}

impl Eq for UnversionedIdentity {}

impl Hash for UnversionedIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded().hash(state);
    }
}

impl Ord for UnversionedIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(&other.folded())
    }
}

impl PartialOrd for UnversionedIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UnversionedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Culture={}, PublicKeyToken={}",
            self.name,
            self.culture,
            self.token_str()
        )
    }
}

// ============================================================================
// Versioned identity
// ============================================================================

/// Unversioned identity plus version; ordered by group, then version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VersionedIdentity {
    pub unversioned: UnversionedIdentity,
    pub version: Version,
}

impl VersionedIdentity {
    pub fn new(unversioned: UnversionedIdentity, version: Version) -> Self {
        Self {
            unversioned,
            version,
        }
    }

    pub fn name(&self) -> &str {
        self.unversioned.name()
    }

    /// Fully qualified name: `Name, Version=V, Culture=C, PublicKeyToken=T`
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VersionedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.unversioned.name(),
            self.version,
            self.unversioned.culture(),
            self.unversioned.token_str()
        )
    }
}

// ============================================================================
// Symbolic name
// ============================================================================

fn symbolic_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^.+,\s*Version=.*,\s*Culture=.*,\s*PublicKeyToken=.*$")
            .expect("symbolic name pattern is a valid regex")
    })
}

/// Whether `source` has the shape of a fully qualified symbolic name.
///
/// Only the 4-part grammar counts; shorter names are treated as paths when
/// they come from configuration.
pub fn is_symbolic_name(source: &str) -> bool {
    symbolic_name_pattern().is_match(source.trim())
}

/// A parsed symbolic name, i.e. a versioned identity known without a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct SymbolicName {
    identity: VersionedIdentity,
}

impl SymbolicName {
    /// Parse `Name[, Version=V][, Culture=C][, PublicKeyToken=T]`.
    ///
    /// Attributes outside the identity (e.g. `ProcessorArchitecture`) are
    /// ignored. A missing version means `0.0.0.0`.
    pub fn parse(text: &str) -> Result<Self, IdentityError> {
        let mut parts = text.split(',');
        let name = parts.next().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if name.contains('=') {
            return Err(IdentityError::Malformed(text.to_string()));
        }

        let mut version = Version::ZERO;
        let mut culture = None;
        let mut token = None;

        for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| IdentityError::Malformed(text.to_string()))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "version" => version = value.parse()?,
                "culture" => culture = Some(value.trim()),
                "publickeytoken" => token = Some(value.trim()),
                _ => {}
            }
        }

        let unversioned = UnversionedIdentity::new(name, token, culture)?;
        Ok(Self {
            identity: VersionedIdentity::new(unversioned, version),
        })
    }

    pub fn identity(&self) -> &VersionedIdentity {
        &self.identity
    }

    pub fn into_identity(self) -> VersionedIdentity {
        self.identity
    }

    /// Registry key: the canonical full name, case-folded
    pub fn key(&self) -> String {
        self.identity.full_name().to_ascii_lowercase()
    }
}

impl From<VersionedIdentity> for SymbolicName {
    fn from(identity: VersionedIdentity) -> Self {
        Self { identity }
    }
}

impl From<SymbolicName> for String {
    fn from(name: SymbolicName) -> Self {
        name.to_string()
    }
}

impl FromStr for SymbolicName {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SymbolicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.fmt(f)
    }
}
