//! Server protocol version and the features each version unlocks.
//!
//! Version skew lives in one place: [`Feature::min_version`]. Callers ask
//! [`ProtocolVersion::supports`] instead of comparing numbers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot parse server version from {raw:?}")]
pub struct VersionParseError {
    raw: String,
}

impl ProtocolVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the output of `tsc --version`, e.g. `Version 3.1.0-dev.20180901`.
    ///
    /// Takes the last whitespace-separated token and drops any prerelease
    /// suffix. A missing patch component counts as zero.
    pub fn parse_version_output(output: &str) -> Result<Self, VersionParseError> {
        let err = || VersionParseError {
            raw: output.trim().to_string(),
        };
        let token = output.split_whitespace().last().ok_or_else(err)?;
        let release = token.split('-').next().ok_or_else(err)?;
        let mut parts = release.split('.').map(str::parse::<u32>);

        let major = parts.next().ok_or_else(err)?.map_err(|_| err())?;
        let minor = parts.next().ok_or_else(err)?.map_err(|_| err())?;
        let patch = match parts.next() {
            Some(p) => p.map_err(|_| err())?,
            None => 0,
        };
        Ok(Self::new(major, minor, patch))
    }

    #[must_use]
    pub fn supports(self, feature: Feature) -> bool {
        self >= feature.min_version()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ProtocolVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_version_output(s)
    }
}

/// Protocol capabilities that depend on the server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// `completionInfo` with member-completion flags instead of a flat `completions` list.
    CompletionInfo,
    TypeDefinition,
    ApplicableRefactors,
    CombinedCodeFix,
    /// The `--locale` launch flag.
    Locale,
    SuggestionDiagnostics,
    OrganizeImports,
}

impl Feature {
    #[must_use]
    pub const fn min_version(self) -> ProtocolVersion {
        match self {
            Self::TypeDefinition => ProtocolVersion::new(2, 2, 0),
            Self::ApplicableRefactors => ProtocolVersion::new(2, 4, 0),
            Self::CombinedCodeFix | Self::Locale => ProtocolVersion::new(2, 6, 0),
            Self::CompletionInfo | Self::SuggestionDiagnostics => ProtocolVersion::new(2, 7, 0),
            Self::OrganizeImports => ProtocolVersion::new(2, 8, 0),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CompletionInfo => "completionInfo",
            Self::TypeDefinition => "typeDefinition",
            Self::ApplicableRefactors => "getApplicableRefactors",
            Self::CombinedCodeFix => "getCombinedCodeFix",
            Self::Locale => "locale",
            Self::SuggestionDiagnostics => "suggestionDiagnosticsSync",
            Self::OrganizeImports => "organizeImports",
        }
    }
}
