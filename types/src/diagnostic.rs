//! Diagnostic wire shape.

use serde::{Deserialize, Serialize};

use crate::{Location, TextSpan};

/// Category reported by the server for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
    Message,
    /// Categories added by newer servers.
    #[serde(other)]
    Unknown,
}

impl DiagnosticCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Suggestion => "suggestion",
            Self::Message => "message",
            Self::Unknown => "unknown",
        }
    }

    /// Name of the sign used to mark diagnostics of this category.
    #[must_use]
    pub fn sign_name(self) -> String {
        format!("TS{}", self.label())
    }

    /// Single-letter type used in location lists (`E`, `W`, `S`, `M`).
    #[must_use]
    pub fn list_type(self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warning => 'W',
            Self::Suggestion => 'S',
            Self::Message | Self::Unknown => 'M',
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// A single diagnostic as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub start: Location,
    pub end: Location,
    pub text: String,
    #[serde(default = "default_category")]
    pub category: DiagnosticCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_category() -> DiagnosticCategory {
    DiagnosticCategory::Error
}

impl Diagnostic {
    #[must_use]
    pub fn span(&self) -> TextSpan {
        TextSpan::new(self.start, self.end)
    }
}

/// Body of the `syntaxDiag` / `semanticDiag` / `suggestionDiag` events.
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticEventBody {
    pub file: String,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_server_diagnostic() {
        let json = serde_json::json!({
            "start": { "line": 1, "offset": 1 },
            "end": { "line": 1, "offset": 5 },
            "text": "Cannot find name 'foo'.",
            "code": 2304,
            "category": "error"
        });
        let diag: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(diag.code, Some(2304));
        assert_eq!(diag.category, DiagnosticCategory::Error);
        assert!(diag.span().contains(1, 1));
    }

    #[test]
    fn missing_category_defaults_to_error() {
        let json = serde_json::json!({
            "start": { "line": 2, "offset": 1 },
            "end": { "line": 2, "offset": 3 },
            "text": "';' expected."
        });
        let diag: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(diag.category, DiagnosticCategory::Error);
        assert!(diag.source.is_none());
    }

    #[test]
    fn unknown_category_is_tolerated() {
        let json = serde_json::json!({
            "start": { "line": 2, "offset": 1 },
            "end": { "line": 2, "offset": 3 },
            "text": "x",
            "category": "hint"
        });
        let diag: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(diag.category, DiagnosticCategory::Unknown);
    }

    #[test]
    fn sign_names_follow_category() {
        assert_eq!(DiagnosticCategory::Error.sign_name(), "TSerror");
        assert_eq!(DiagnosticCategory::Suggestion.sign_name(), "TSsuggestion");
        assert_eq!(DiagnosticCategory::Warning.list_type(), 'W');
    }

    #[test]
    fn event_body_without_diagnostics_is_empty() {
        let body: DiagnosticEventBody =
            serde_json::from_value(serde_json::json!({ "file": "/a.ts" })).unwrap();
        assert!(body.diagnostics.is_empty());
    }
}
