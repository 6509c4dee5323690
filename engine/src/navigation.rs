//! Navigation commands: type info, definitions, references, rename,
//! symbols and project info.

use std::path::Path;

use tsbridge_editor::{EchoLevel, EditorHost, ListEntry, ListKind, truncate_message};
use tsbridge_types::{
    CodeEdit, FileCodeEdits, FileSpan, Location, NavigationTree, NavtoArgs, ProjectInfo,
    ProjectInfoArgs, QuickInfo, RenameArgs,
};

use crate::bridge::Bridge;
use crate::error::BridgeError;

pub const REFERENCES_LIST_TITLE: &str = "References";
pub const RENAMES_LIST_TITLE: &str = "Renames";
pub const SYMBOLS_LIST_TITLE: &str = "Symbols";
pub const WORKSPACE_SYMBOLS_LIST_TITLE: &str = "WorkspaceSymbols";
/// Upper bound on `navto` results.
pub const WORKSPACE_SYMBOLS_LIMIT: u32 = 50;
/// Preview window that [`Bridge::doc`] writes to.
pub const DOC_PREVIEW_TITLE: &str = "__doc__";
pub const MSG_INFERRED_PROJECT: &str = "Can't edit config, in an inferred project";

/// Top-level items and their direct children, in tree order.
fn symbol_entries(file: &str, tree: &NavigationTree) -> Vec<ListEntry> {
    let entry = |item: &NavigationTree| {
        item.spans.first().map(|span| ListEntry {
            filename: file.to_string(),
            lnum: span.start.line,
            col: span.start.offset,
            text: item.text.clone(),
            kind: None,
        })
    };

    let mut entries = Vec::new();
    for item in &tree.child_items {
        entries.extend(entry(item));
        entries.extend(item.child_items.iter().filter_map(entry));
    }
    entries
}

impl<H: EditorHost> Bridge<H> {
    /// Echo the type of the symbol under the cursor.
    pub async fn show_type(&self) -> Result<Option<QuickInfo>, BridgeError> {
        self.reload_file().await?;
        let args = self.cursor_args().await?;
        let result = self.running()?.quick_info(&args).await;
        let Some(info) = self.settle(result, "No type information").await? else {
            return Ok(None);
        };
        if info.kind.is_empty() {
            return Ok(None);
        }
        let width = self.host.message_width().await?;
        self.echo(EchoLevel::Info, &truncate_message(&info.display_string, width))
            .await?;
        Ok(Some(info))
    }

    /// Show the signature and documentation of the symbol under the cursor
    /// in the preview window. Returns the lines shown.
    pub async fn doc(&self) -> Result<Option<Vec<String>>, BridgeError> {
        self.reload_file().await?;
        let args = self.cursor_args().await?;
        let result = self.running()?.quick_info(&args).await;
        let Some(info) = self.settle(result, "No documentation").await? else {
            return Ok(None);
        };
        if info.kind.is_empty() {
            return Ok(None);
        }
        let lines: Vec<String> = info
            .display_string
            .lines()
            .chain(info.documentation.lines())
            .map(str::to_string)
            .collect();
        self.host.show_preview(DOC_PREVIEW_TITLE, &lines).await?;
        Ok(Some(lines))
    }

    /// Echo the signature being filled in at the cursor.
    pub async fn signature(&self) -> Result<Option<String>, BridgeError> {
        self.reload_file().await?;
        let args = self.cursor_args().await?;
        let result = self.running()?.signature_help(&args).await;
        let Some(help) = self.settle(result, "No signature help").await? else {
            return Ok(None);
        };
        let Some(item) = help
            .items
            .get(help.selected_item_index)
            .or_else(|| help.items.first())
        else {
            return Ok(None);
        };
        let label = item.label();
        self.echo(EchoLevel::Info, &label).await?;
        Ok(Some(label))
    }

    pub async fn goto_definition(&self) -> Result<Option<FileSpan>, BridgeError> {
        self.reload_file().await?;
        let args = self.cursor_args().await?;
        let result = self.running()?.definition(&args).await;
        let spans = self.settle(result, "Definition not found").await?;
        self.jump_to_first(spans.unwrap_or_default(), "Definition not found")
            .await
    }

    pub async fn goto_type_definition(&self) -> Result<Option<FileSpan>, BridgeError> {
        self.reload_file().await?;
        let args = self.cursor_args().await?;
        let result = self.running()?.type_definition(&args).await;
        let spans = self.settle(result, "Type definition not found").await?;
        self.jump_to_first(spans.unwrap_or_default(), "Type definition not found")
            .await
    }

    async fn jump_to_first(
        &self,
        spans: Vec<FileSpan>,
        not_found: &str,
    ) -> Result<Option<FileSpan>, BridgeError> {
        let Some(target) = spans.into_iter().next() else {
            self.echo(EchoLevel::Info, not_found).await?;
            return Ok(None);
        };
        self.host.open_location(&target.file, target.start).await?;
        Ok(Some(target))
    }

    /// Fill the quickfix list with every reference to the symbol under
    /// the cursor. Returns how many there are.
    pub async fn references(&self) -> Result<usize, BridgeError> {
        self.reload_file().await?;
        let args = self.cursor_args().await?;
        let result = self.running()?.references(&args).await;
        let Some(response) = self.settle(result, "References not found").await? else {
            return Ok(0);
        };
        if response.refs.is_empty() {
            self.echo(EchoLevel::Info, "References not found").await?;
            return Ok(0);
        }

        let entries: Vec<ListEntry> = response
            .refs
            .iter()
            .map(|r| ListEntry {
                filename: r.file.clone(),
                lnum: r.start.line,
                col: r.start.offset,
                text: r.line_text.trim().to_string(),
                kind: None,
            })
            .collect();
        self.host
            .set_list(ListKind::Quickfix, REFERENCES_LIST_TITLE, &entries)
            .await?;
        Ok(entries.len())
    }

    /// Rename the symbol under the cursor everywhere the server finds it.
    ///
    /// The edits go to the host in one batch; the cursor is put back where
    /// it was. Returns how many locations changed.
    pub async fn rename(&self, new_name: &str) -> Result<usize, BridgeError> {
        self.reload_file().await?;
        let location = self.cursor_args().await?;
        let cursor = self.host.cursor().await?;
        let args = RenameArgs {
            location,
            find_in_comments: false,
            find_in_strings: false,
        };
        let result = self.running()?.rename(&args).await;
        let Some(response) = self.settle(result, "Cannot rename this symbol").await? else {
            return Ok(0);
        };

        if !response.info.can_rename {
            let message = response
                .info
                .localized_error_message
                .as_deref()
                .unwrap_or("Cannot rename this symbol");
            self.echo(EchoLevel::Error, message).await?;
            return Ok(0);
        }

        let old_name = &response.info.display_name;
        let mut edits = Vec::with_capacity(response.locs.len());
        let mut entries = Vec::new();
        for group in &response.locs {
            edits.push(FileCodeEdits {
                file_name: group.file.clone(),
                text_changes: group
                    .locs
                    .iter()
                    .map(|span| CodeEdit {
                        start: span.start,
                        end: span.end,
                        new_text: new_name.to_string(),
                    })
                    .collect(),
            });
            entries.extend(group.locs.iter().map(|span| ListEntry {
                filename: group.file.clone(),
                lnum: span.start.line,
                col: span.start.offset,
                text: format!("Replaced {old_name} with {new_name}"),
                kind: None,
            }));
        }

        self.host.apply_edits(&edits).await?;
        self.host.set_cursor(cursor).await?;
        self.host
            .set_list(ListKind::Quickfix, RENAMES_LIST_TITLE, &entries)
            .await?;
        self.echo(
            EchoLevel::Info,
            &format!("Replaced {} in {} files", entries.len(), edits.len()),
        )
        .await?;
        Ok(entries.len())
    }

    /// Fill the location list with the current file's symbols.
    pub async fn document_symbols(&self) -> Result<usize, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let result = self.running()?.document_symbols(&file).await;
        let Some(tree) = self.settle(result, "No symbols").await? else {
            return Ok(0);
        };
        let entries = symbol_entries(&file, &tree);
        if !entries.is_empty() {
            self.host
                .set_list(ListKind::Location, SYMBOLS_LIST_TITLE, &entries)
                .await?;
        }
        Ok(entries.len())
    }

    /// Search symbols across the project and fill the location list.
    pub async fn workspace_symbols(&self, query: &str) -> Result<usize, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let args = NavtoArgs {
            file,
            search_value: query.to_string(),
            max_result_count: WORKSPACE_SYMBOLS_LIMIT,
        };
        let result = self.running()?.workspace_symbols(&args).await;
        let Some(items) = self.settle(result, "No symbols found").await? else {
            return Ok(0);
        };

        let completion = &self.config.completion;
        let entries: Vec<ListEntry> = items
            .iter()
            .map(|item| ListEntry {
                filename: item.file.clone(),
                lnum: item.start.line,
                col: item.start.offset,
                text: format!("{}\t {}", completion.kind_symbol(&item.kind), item.name),
                kind: None,
            })
            .collect();
        self.host
            .set_list(ListKind::Location, WORKSPACE_SYMBOLS_LIST_TITLE, &entries)
            .await?;
        Ok(entries.len())
    }

    /// Echo which project the current file belongs to.
    pub async fn project_info(&self) -> Result<Option<ProjectInfo>, BridgeError> {
        let args = ProjectInfoArgs {
            file: self.current_file().await?,
            need_file_name_list: true,
        };
        let result = self.running()?.project_info(&args).await;
        let Some(info) = self.settle(result, "No project information").await? else {
            return Ok(None);
        };
        let message = match &info.file_names {
            Some(files) => format!("{} ({} files)", info.config_file_name, files.len()),
            None => info.config_file_name.clone(),
        };
        self.echo(EchoLevel::Info, &message).await?;
        Ok(Some(info))
    }

    /// Open the config file of the current file's project.
    ///
    /// Inferred projects have no config on disk; that is reported instead.
    pub async fn edit_config(&self) -> Result<Option<String>, BridgeError> {
        self.reload_file().await?;
        let args = ProjectInfoArgs {
            file: self.current_file().await?,
            need_file_name_list: false,
        };
        let result = self.running()?.project_info(&args).await;
        let Some(info) = self.settle(result, "No project information").await? else {
            return Ok(None);
        };
        if !Path::new(&info.config_file_name).is_file() {
            self.echo(EchoLevel::Error, MSG_INFERRED_PROJECT).await?;
            return Ok(None);
        }
        self.host
            .open_location(&info.config_file_name, Location::new(1, 1))
            .await?;
        Ok(Some(info.config_file_name))
    }

    /// Make the server reload every project, then refresh diagnostics.
    pub async fn reload_project(&mut self) -> Result<(), BridgeError> {
        self.running()?.reload_projects().await?;
        tracing::info!("Projects reloaded");
        if self.config.diagnostics.enable && !self.host.current_file().await?.is_empty() {
            self.diagnostics().await?;
        }
        Ok(())
    }
}
