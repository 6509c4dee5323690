//! Argument bodies for the commands the client sends.
//!
//! Field names serialize in the camelCase spelling the server expects.

use serde::Serialize;

use crate::{Location, TextSpan};

/// `{ file }`: navtree, semantic/syntactic/suggestion diagnostics, close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileArgs {
    pub file: String,
}

impl FileArgs {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

/// `open` arguments. `file_content` lets the client open unsaved buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenArgs {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root_path: Option<String>,
}

/// `reload` arguments: the server re-reads `file` from `tmpfile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadArgs {
    pub file: String,
    pub tmpfile: String,
}

/// `saveto` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveToArgs {
    pub file: String,
    pub tmpfile: String,
}

/// `{ file, line, offset }`: quickinfo, definition, references, signature help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLocationArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
}

impl FileLocationArgs {
    pub fn new(file: impl Into<String>, line: u32, offset: u32) -> Self {
        Self {
            file: file.into(),
            line,
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameArgs {
    #[serde(flatten)]
    pub location: FileLocationArgs,
    pub find_in_comments: bool,
    pub find_in_strings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsArgs {
    #[serde(flatten)]
    pub location: FileLocationArgs,
    pub prefix: String,
    /// Only understood by servers that support `completionInfo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_insert_text_completions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_external_module_exports: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetailsArgs {
    #[serde(flatten)]
    pub location: FileLocationArgs,
    pub entry_names: Vec<String>,
}

/// A line/offset range inside one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRangeArgs {
    pub file: String,
    pub start_line: u32,
    pub start_offset: u32,
    pub end_line: u32,
    pub end_offset: u32,
}

impl FileRangeArgs {
    pub fn span(file: impl Into<String>, span: TextSpan) -> Self {
        Self {
            file: file.into(),
            start_line: span.start.line,
            start_offset: span.start.offset,
            end_line: span.end.line,
            end_offset: span.end.offset,
        }
    }

    /// An empty range at `at`.
    pub fn point(file: impl Into<String>, at: Location) -> Self {
        Self::span(file, TextSpan::new(at, at))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFixArgs {
    #[serde(flatten)]
    pub range: FileRangeArgs,
    pub error_codes: Vec<u32>,
}

/// `getEditsForRefactor`: one action of one applicable refactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefactorEditsArgs {
    #[serde(flatten)]
    pub range: FileRangeArgs,
    pub refactor: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavtoArgs {
    pub file: String,
    pub search_value: String,
    pub max_result_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfoArgs {
    pub file: String,
    pub need_file_name_list: bool,
}

/// `geterr` arguments; results arrive later as diagnostic events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetErrArgs {
    pub files: Vec<String>,
    pub delay: u32,
}

/// `{ type: "file", args: { file } }`, the only scope the bridge uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileScope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub args: FileArgs,
}

impl FileScope {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            kind: "file",
            args: FileArgs::new(file),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizeImportsArgs {
    pub scope: FileScope,
}

impl OrganizeImportsArgs {
    pub fn for_file(file: impl Into<String>) -> Self {
        Self {
            scope: FileScope::file(file),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedCodeFixArgs {
    pub scope: FileScope,
    pub fix_id: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_args_flatten_location() {
        let args = RenameArgs {
            location: FileLocationArgs::new("a.ts", 3, 4),
            find_in_comments: false,
            find_in_strings: false,
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["file"], "a.ts");
        assert_eq!(json["line"], 3);
        assert_eq!(json["findInComments"], false);
    }

    #[test]
    fn refactor_args_carry_point_range() {
        let args = RefactorEditsArgs {
            range: FileRangeArgs::point("a.ts", Location::new(4, 9)),
            refactor: "Extract Symbol".to_string(),
            action: "function_scope_0".to_string(),
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["startLine"], 4);
        assert_eq!(json["endOffset"], 9);
        assert_eq!(json["refactor"], "Extract Symbol");
    }

    #[test]
    fn completion_args_omit_unset_flags() {
        let args = CompletionsArgs {
            location: FileLocationArgs::new("a.ts", 1, 2),
            prefix: "fo".to_string(),
            trigger_character: None,
            include_insert_text_completions: None,
            include_external_module_exports: None,
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["prefix"], "fo");
        assert!(json.get("triggerCharacter").is_none());
        assert!(json.get("includeInsertTextCompletions").is_none());
    }

    #[test]
    fn code_fix_args_use_camel_case() {
        let args = CodeFixArgs {
            range: FileRangeArgs {
                file: "a.ts".to_string(),
                start_line: 1,
                start_offset: 2,
                end_line: 1,
                end_offset: 6,
            },
            error_codes: vec![2304],
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["startOffset"], 2);
        assert_eq!(json["errorCodes"][0], 2304);
    }

    #[test]
    fn organize_imports_scope_shape() {
        let json = serde_json::to_value(OrganizeImportsArgs::for_file("a.ts")).unwrap();
        assert_eq!(json["scope"]["type"], "file");
        assert_eq!(json["scope"]["args"]["file"], "a.ts");
    }
}
