//! Typed command surface over the correlator.
//!
//! One method per server command. Apart from picking the command name,
//! the only logic here is the version gate: commands the connected server
//! is too old for fail with [`RpcError::Unsupported`] before anything is
//! written.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tsbridge_types::{
    ApplicableRefactorInfo, CodeFixAction, CodeFixArgs, CombinedCodeActions, CombinedCodeFixArgs,
    CompletionDetailsArgs, CompletionEntry, CompletionEntryDetails, CompletionInfo,
    CompletionsArgs, Diagnostic, Feature, FileArgs, FileCodeEdits, FileLocationArgs,
    FileRangeArgs, FileSpan, GetErrArgs, NavigationTree, NavtoArgs, NavtoItem, OpenArgs,
    OrganizeImportsArgs, ProjectInfo, ProjectInfoArgs, ProtocolVersion, QuickInfo,
    RefactorEditInfo, RefactorEditsArgs, ReferencesResponse, ReloadArgs, RenameArgs,
    RenameResponse, SaveToArgs, SignatureHelpItems,
};

use crate::process::{self, ServerCommand, ServerProcess, SpawnError};
use crate::rpc::{RpcClient, RpcError, RpcOptions};

/// Assumed when the version cannot be queried: new enough for every gated command.
pub const FALLBACK_VERSION: ProtocolVersion = ProtocolVersion::new(2, 8, 0);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub command: ServerCommand,
    /// Language for server messages. Ignored by servers without locale support.
    pub locale: Option<String>,
    /// Skip the version query and use this instead.
    pub version: Option<ProtocolVersion>,
    pub rpc: RpcOptions,
}

impl ServerSettings {
    pub fn new(command: ServerCommand) -> Self {
        Self {
            command,
            locale: None,
            version: None,
            rpc: RpcOptions::default(),
        }
    }
}

/// A connected analysis server.
#[derive(Debug)]
pub struct TsServer {
    process: Option<ServerProcess>,
    rpc: RpcClient,
    version: ProtocolVersion,
}

impl TsServer {
    /// Resolve the protocol version, spawn the server and connect to it.
    pub async fn start(settings: &ServerSettings) -> Result<Self, SpawnError> {
        let version = match settings.version {
            Some(v) => v,
            None => match process::query_version(&settings.command.program).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        server = %settings.command.program,
                        fallback = %FALLBACK_VERSION,
                        "Could not determine server version: {e}"
                    );
                    FALLBACK_VERSION
                }
            },
        };

        let mut command = settings.command.clone();
        if version.supports(Feature::Locale) {
            command = command.locale(settings.locale.as_deref());
        }

        let (process, io) = ServerProcess::start(&command)?;
        let rpc = RpcClient::connect(io.stdout, io.stdin, settings.rpc);
        tracing::info!(server = %command.program, %version, "Connected to analysis server");

        Ok(Self {
            process: Some(process),
            rpc,
            version,
        })
    }

    /// Wrap an existing connection, e.g. an in-process pipe.
    pub fn from_parts(rpc: RpcClient, version: ProtocolVersion) -> Self {
        Self {
            process: None,
            rpc,
            version,
        }
    }

    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        self.version.supports(feature)
    }

    #[must_use]
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ServerProcess::pid)
    }

    /// Close the pipes and terminate the process. Safe to call twice.
    pub async fn stop(&mut self) {
        self.rpc.disconnect();
        if let Some(process) = self.process.as_mut() {
            process.stop().await;
        }
    }

    fn require(&self, feature: Feature) -> Result<(), RpcError> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(RpcError::Unsupported {
                feature,
                version: self.version,
            })
        }
    }

    async fn request<A, R>(&self, command: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.rpc.request(command, args).await
    }

    /// For list-valued bodies, where an absent body means "nothing".
    async fn request_list<A, T>(&self, command: &str, args: &A) -> Result<Vec<T>, RpcError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body: Option<Vec<T>> = self.rpc.request(command, args).await?;
        Ok(body.unwrap_or_default())
    }

    // ── Buffer lifecycle ────────────────────────────────────────────────

    pub async fn open_file(&self, file: &str, content: Option<String>) -> Result<(), RpcError> {
        let args = OpenArgs {
            file: file.to_string(),
            file_content: content,
            project_root_path: None,
        };
        self.rpc.send("open", &args).await
    }

    pub async fn close_file(&self, file: &str) -> Result<(), RpcError> {
        self.rpc.send("close", &FileArgs::new(file)).await
    }

    /// Make the server re-read `file` from `tmpfile`. Waits for the ack.
    pub async fn reload_file(&self, file: &str, tmpfile: &str) -> Result<(), RpcError> {
        let args = ReloadArgs {
            file: file.to_string(),
            tmpfile: tmpfile.to_string(),
        };
        let _: serde_json::Value = self.request("reload", &args).await?;
        Ok(())
    }

    pub async fn reload_projects(&self) -> Result<(), RpcError> {
        self.rpc.notify("reloadProjects", None).await.map(|_| ())
    }

    pub async fn save_to(&self, file: &str, tmpfile: &str) -> Result<(), RpcError> {
        let args = SaveToArgs {
            file: file.to_string(),
            tmpfile: tmpfile.to_string(),
        };
        self.rpc.send("saveto", &args).await
    }

    /// Request diagnostics for `files`. Results arrive as events.
    pub async fn get_err(&self, files: Vec<String>, delay: u32) -> Result<(), RpcError> {
        self.rpc.send("geterr", &GetErrArgs { files, delay }).await
    }

    // ── Navigation ──────────────────────────────────────────────────────

    pub async fn quick_info(&self, args: &FileLocationArgs) -> Result<QuickInfo, RpcError> {
        self.request("quickinfo", args).await
    }

    pub async fn definition(&self, args: &FileLocationArgs) -> Result<Vec<FileSpan>, RpcError> {
        self.request_list("definition", args).await
    }

    pub async fn type_definition(
        &self,
        args: &FileLocationArgs,
    ) -> Result<Vec<FileSpan>, RpcError> {
        self.require(Feature::TypeDefinition)?;
        self.request_list("typeDefinition", args).await
    }

    pub async fn references(
        &self,
        args: &FileLocationArgs,
    ) -> Result<ReferencesResponse, RpcError> {
        self.request("references", args).await
    }

    pub async fn signature_help(
        &self,
        args: &FileLocationArgs,
    ) -> Result<SignatureHelpItems, RpcError> {
        self.request("signatureHelp", args).await
    }

    pub async fn rename(&self, args: &RenameArgs) -> Result<RenameResponse, RpcError> {
        self.request("rename", args).await
    }

    pub async fn document_symbols(&self, file: &str) -> Result<NavigationTree, RpcError> {
        self.request("navtree", &FileArgs::new(file)).await
    }

    pub async fn workspace_symbols(&self, args: &NavtoArgs) -> Result<Vec<NavtoItem>, RpcError> {
        self.request_list("navto", args).await
    }

    pub async fn project_info(&self, args: &ProjectInfoArgs) -> Result<ProjectInfo, RpcError> {
        self.request("projectInfo", args).await
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// `completionInfo` on servers that have it, else `completions`.
    pub async fn completions(&self, args: &CompletionsArgs) -> Result<CompletionInfo, RpcError> {
        if self.supports(Feature::CompletionInfo) {
            return self.request("completionInfo", args).await;
        }

        // Older servers reject the newer fields.
        let legacy = CompletionsArgs {
            location: args.location.clone(),
            prefix: args.prefix.clone(),
            trigger_character: None,
            include_insert_text_completions: None,
            include_external_module_exports: None,
        };
        let entries: Vec<CompletionEntry> = self.request_list("completions", &legacy).await?;
        Ok(CompletionInfo::from_entries(entries))
    }

    pub async fn completion_details(
        &self,
        args: &CompletionDetailsArgs,
    ) -> Result<Vec<CompletionEntryDetails>, RpcError> {
        self.request_list("completionEntryDetails", args).await
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    pub async fn semantic_diagnostics(&self, file: &str) -> Result<Vec<Diagnostic>, RpcError> {
        self.request_list("semanticDiagnosticsSync", &FileArgs::new(file))
            .await
    }

    pub async fn syntactic_diagnostics(&self, file: &str) -> Result<Vec<Diagnostic>, RpcError> {
        self.request_list("syntacticDiagnosticsSync", &FileArgs::new(file))
            .await
    }

    pub async fn suggestion_diagnostics(&self, file: &str) -> Result<Vec<Diagnostic>, RpcError> {
        self.require(Feature::SuggestionDiagnostics)?;
        self.request_list("suggestionDiagnosticsSync", &FileArgs::new(file))
            .await
    }

    // ── Code actions ────────────────────────────────────────────────────

    pub async fn code_fixes(&self, args: &CodeFixArgs) -> Result<Vec<CodeFixAction>, RpcError> {
        self.request_list("getCodeFixes", args).await
    }

    pub async fn applicable_refactors(
        &self,
        args: &FileRangeArgs,
    ) -> Result<Vec<ApplicableRefactorInfo>, RpcError> {
        self.require(Feature::ApplicableRefactors)?;
        self.request_list("getApplicableRefactors", args).await
    }

    pub async fn edits_for_refactor(
        &self,
        args: &RefactorEditsArgs,
    ) -> Result<RefactorEditInfo, RpcError> {
        self.require(Feature::ApplicableRefactors)?;
        self.request("getEditsForRefactor", args).await
    }

    pub async fn combined_code_fix(
        &self,
        args: &CombinedCodeFixArgs,
    ) -> Result<CombinedCodeActions, RpcError> {
        self.require(Feature::CombinedCodeFix)?;
        self.request("getCombinedCodeFix", args).await
    }

    pub async fn organize_imports(&self, file: &str) -> Result<Vec<FileCodeEdits>, RpcError> {
        self.require(Feature::OrganizeImports)?;
        self.request_list("organizeImports", &OrganizeImportsArgs::for_file(file))
            .await
    }
}
