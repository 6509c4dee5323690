//! Headless in-memory editor host.
//!
//! Backs the command-line front end and the test suites. It enforces the
//! host contract strictly: placing a marker id that is already placed is
//! rejected, so leaked or duplicated markers show up as errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tsbridge_types::{FileCodeEdits, Location, char_index_at};

use crate::host::{
    EchoLevel, EditorHost, Highlight, HostError, HostFut, ListEntry, ListKind, Marker,
    SignDefinition,
};

/// Marker and highlight operations, in the order the host received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Place { file: String, id: u64 },
    Remove { file: String, id: u64 },
    Paint { file: String, id: u64 },
    ClearHighlights { file: String },
}

#[derive(Debug, Clone)]
pub struct NamedList {
    pub title: String,
    pub entries: Vec<ListEntry>,
}

#[derive(Debug, Default)]
struct State {
    file: String,
    lines: Vec<String>,
    cursor: Location,
    message_width: usize,
    signs: Vec<SignDefinition>,
    markers: BTreeMap<u64, Marker>,
    highlights: HashMap<String, Vec<Highlight>>,
    lists: HashMap<ListKind, NamedList>,
    messages: Vec<(EchoLevel, String)>,
    vars: HashMap<String, Value>,
    edits: Vec<FileCodeEdits>,
    opened: Vec<(String, Location)>,
    previews: Vec<(String, Vec<String>)>,
    choice: Option<usize>,
    ops: Vec<HostOp>,
}

#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                cursor: Location::new(1, 1),
                message_width: 80,
                choice: Some(0),
                ..State::default()
            }),
        }
    }

    /// Make `file` with `text` the current buffer.
    pub fn open_buffer(&self, file: impl Into<String>, text: &str) {
        let mut state = self.lock();
        state.file = file.into();
        state.lines = text.lines().map(str::to_string).collect();
        state.cursor = Location::new(1, 1);
    }

    pub fn move_cursor(&self, line: u32, offset: u32) {
        self.lock().cursor = Location::new(line, offset);
    }

    pub fn set_message_width(&self, width: usize) {
        self.lock().message_width = width;
    }

    /// What [`EditorHost::choose`] answers. Defaults to the first option.
    pub fn set_choice(&self, choice: Option<usize>) {
        self.lock().choice = choice;
    }

    pub fn insert_var(&self, name: &str, value: Value) {
        self.lock().vars.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn buffer_text(&self) -> String {
        self.lock().lines.join("\n")
    }

    #[must_use]
    pub fn cursor_position(&self) -> Location {
        self.lock().cursor
    }

    /// Placed markers of `file`, ordered by id.
    #[must_use]
    pub fn markers(&self, file: &str) -> Vec<Marker> {
        self.lock()
            .markers
            .values()
            .filter(|m| m.file == file)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn highlights(&self, file: &str) -> Vec<Highlight> {
        self.lock().highlights.get(file).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn signs(&self) -> Vec<SignDefinition> {
        self.lock().signs.clone()
    }

    #[must_use]
    pub fn list(&self, kind: ListKind) -> Option<NamedList> {
        self.lock().lists.get(&kind).cloned()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<(EchoLevel, String)> {
        self.lock().messages.clone()
    }

    #[must_use]
    pub fn last_message(&self) -> Option<String> {
        self.lock().messages.last().map(|(_, m)| m.clone())
    }

    #[must_use]
    pub fn var(&self, name: &str) -> Option<Value> {
        self.lock().vars.get(name).cloned()
    }

    #[must_use]
    pub fn applied_edits(&self) -> Vec<FileCodeEdits> {
        self.lock().edits.clone()
    }

    #[must_use]
    pub fn opened(&self) -> Vec<(String, Location)> {
        self.lock().opened.clone()
    }

    /// Preview windows shown so far, as `(title, lines)`.
    #[must_use]
    pub fn previews(&self) -> Vec<(String, Vec<String>)> {
        self.lock().previews.clone()
    }

    /// Drain the marker/highlight operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.lock().ops)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, HostError>,
    ) -> HostFut<'_, T> {
        let result = f(&mut self.lock());
        Box::pin(async move { result })
    }
}

impl EditorHost for MemoryHost {
    fn current_file(&self) -> HostFut<'_, String> {
        self.with(|s| Ok(s.file.clone()))
    }

    fn buffer_lines(&self) -> HostFut<'_, Vec<String>> {
        self.with(|s| Ok(s.lines.clone()))
    }

    fn cursor(&self) -> HostFut<'_, Location> {
        self.with(|s| Ok(s.cursor))
    }

    fn set_cursor(&self, position: Location) -> HostFut<'_, ()> {
        self.with(move |s| {
            s.cursor = position;
            Ok(())
        })
    }

    fn define_sign<'a>(&'a self, sign: &'a SignDefinition) -> HostFut<'a, ()> {
        self.with(|s| {
            s.signs.retain(|d| d.name != sign.name);
            s.signs.push(sign.clone());
            Ok(())
        })
    }

    fn place_marker<'a>(&'a self, marker: &'a Marker) -> HostFut<'a, ()> {
        self.with(|s| {
            if s.markers.contains_key(&marker.id) {
                return Err(HostError::Rejected {
                    operation: "place_marker",
                    message: format!("marker id {} is already placed", marker.id),
                });
            }
            s.markers.insert(marker.id, marker.clone());
            s.ops.push(HostOp::Place {
                file: marker.file.clone(),
                id: marker.id,
            });
            Ok(())
        })
    }

    fn remove_marker<'a>(&'a self, file: &'a str, id: u64) -> HostFut<'a, ()> {
        self.with(move |s| {
            if s.markers.get(&id).is_some_and(|m| m.file == file) {
                s.markers.remove(&id);
            }
            s.ops.push(HostOp::Remove {
                file: file.to_string(),
                id,
            });
            Ok(())
        })
    }

    fn paint_highlight<'a>(
        &'a self,
        file: &'a str,
        highlight: &'a Highlight,
    ) -> HostFut<'a, ()> {
        self.with(|s| {
            s.highlights
                .entry(file.to_string())
                .or_default()
                .push(highlight.clone());
            s.ops.push(HostOp::Paint {
                file: file.to_string(),
                id: highlight.id,
            });
            Ok(())
        })
    }

    fn clear_highlights<'a>(&'a self, file: &'a str) -> HostFut<'a, ()> {
        self.with(|s| {
            s.highlights.remove(file);
            s.ops.push(HostOp::ClearHighlights {
                file: file.to_string(),
            });
            Ok(())
        })
    }

    fn set_list<'a>(
        &'a self,
        kind: ListKind,
        title: &'a str,
        entries: &'a [ListEntry],
    ) -> HostFut<'a, ()> {
        self.with(move |s| {
            s.lists.insert(
                kind,
                NamedList {
                    title: title.to_string(),
                    entries: entries.to_vec(),
                },
            );
            Ok(())
        })
    }

    fn open_location<'a>(&'a self, file: &'a str, position: Location) -> HostFut<'a, ()> {
        self.with(move |s| {
            s.opened.push((file.to_string(), position));
            if s.file == file {
                s.cursor = position;
            }
            Ok(())
        })
    }

    fn show_preview<'a>(&'a self, title: &'a str, lines: &'a [String]) -> HostFut<'a, ()> {
        self.with(|s| {
            s.previews.retain(|(t, _)| t != title);
            s.previews.push((title.to_string(), lines.to_vec()));
            Ok(())
        })
    }

    fn echo<'a>(&'a self, level: EchoLevel, message: &'a str) -> HostFut<'a, ()> {
        self.with(move |s| {
            s.messages.push((level, message.to_string()));
            Ok(())
        })
    }

    fn get_var<'a>(&'a self, name: &'a str) -> HostFut<'a, Option<Value>> {
        self.with(|s| Ok(s.vars.get(name).cloned()))
    }

    fn set_var<'a>(&'a self, name: &'a str, value: Value) -> HostFut<'a, ()> {
        self.with(move |s| {
            s.vars.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn apply_edits<'a>(&'a self, edits: &'a [FileCodeEdits]) -> HostFut<'a, ()> {
        self.with(|s| {
            for file_edits in edits {
                if file_edits.file_name == s.file {
                    let text = apply_to_text(&s.lines.join("\n"), file_edits);
                    s.lines = text.split('\n').map(str::to_string).collect();
                }
            }
            s.edits.extend_from_slice(edits);
            Ok(())
        })
    }

    fn choose<'a>(&'a self, _prompt: &'a str, options: &'a [String]) -> HostFut<'a, Option<usize>> {
        self.with(|s| Ok(s.choice.filter(|i| *i < options.len())))
    }

    fn message_width(&self) -> HostFut<'_, usize> {
        self.with(|s| Ok(s.message_width))
    }
}

/// Apply one file's edits to `text`, last edit first so earlier positions stay valid.
fn apply_to_text(text: &str, edits: &FileCodeEdits) -> String {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let to_byte = |loc: Location| -> usize {
        let Some(&start) = line_starts.get(loc.line.saturating_sub(1) as usize) else {
            return text.len();
        };
        let line = &text[start..];
        let line = line.split('\n').next().unwrap_or_default();
        let chars = char_index_at(line, loc.offset);
        start
            + line
                .char_indices()
                .nth(chars)
                .map_or(line.len(), |(i, _)| i)
    };

    let mut ranges: Vec<(usize, usize, &str)> = edits
        .text_changes
        .iter()
        .map(|e| (to_byte(e.start), to_byte(e.end), e.new_text.as_str()))
        .collect();
    ranges.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = text.to_string();
    for (start, end, new_text) in ranges {
        out.replace_range(start..end.max(start), new_text);
    }
    out
}

#[cfg(test)]
mod tests {
    use tsbridge_types::CodeEdit;

    use super::*;

    fn edit(line: u32, start: u32, end: u32, new_text: &str) -> CodeEdit {
        CodeEdit {
            start: Location::new(line, start),
            end: Location::new(line, end),
            new_text: new_text.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_marker_is_rejected() {
        let host = MemoryHost::new();
        let marker = Marker {
            id: 7,
            file: "a.ts".to_string(),
            line: 1,
            sign: "TSerror".to_string(),
        };
        host.place_marker(&marker).await.unwrap();
        assert!(matches!(
            host.place_marker(&marker).await,
            Err(HostError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn removing_unknown_marker_is_noop() {
        let host = MemoryHost::new();
        host.remove_marker("a.ts", 99).await.unwrap();
        assert!(host.markers("a.ts").is_empty());
    }

    #[tokio::test]
    async fn edits_apply_to_current_buffer() {
        let host = MemoryHost::new();
        host.open_buffer("/a.ts", "const foo = 1;\nfoo + foo;");
        let edits = vec![FileCodeEdits {
            file_name: "/a.ts".to_string(),
            text_changes: vec![
                edit(1, 7, 10, "bar"),
                edit(2, 1, 4, "bar"),
                edit(2, 7, 10, "bar"),
            ],
        }];
        host.apply_edits(&edits).await.unwrap();
        assert_eq!(host.buffer_text(), "const bar = 1;\nbar + bar;");
    }

    #[tokio::test]
    async fn insertion_at_line_start() {
        let host = MemoryHost::new();
        host.open_buffer("/a.ts", "foo();");
        let edits = vec![FileCodeEdits {
            file_name: "/a.ts".to_string(),
            text_changes: vec![edit(1, 1, 1, "import { foo } from './foo';\n")],
        }];
        host.apply_edits(&edits).await.unwrap();
        assert_eq!(host.buffer_text(), "import { foo } from './foo';\nfoo();");
    }

    #[tokio::test]
    async fn edit_offsets_count_utf16_units() {
        let host = MemoryHost::new();
        host.open_buffer("/a.ts", "const \u{1F600} = foo;");
        let edits = vec![FileCodeEdits {
            file_name: "/a.ts".to_string(),
            text_changes: vec![edit(1, 12, 15, "bar")],
        }];
        host.apply_edits(&edits).await.unwrap();
        assert_eq!(host.buffer_text(), "const \u{1F600} = bar;");
    }

    #[tokio::test]
    async fn preview_with_same_title_is_replaced() {
        let host = MemoryHost::new();
        host.show_preview("__doc__", &["a".to_string()]).await.unwrap();
        host.show_preview("__doc__", &["b".to_string()]).await.unwrap();
        assert_eq!(
            host.previews(),
            vec![("__doc__".to_string(), vec!["b".to_string()])]
        );
    }

    #[tokio::test]
    async fn choice_out_of_range_is_cancel() {
        let host = MemoryHost::new();
        host.set_choice(Some(3));
        let options = vec!["a".to_string()];
        assert_eq!(host.choose("pick", &options).await.unwrap(), None);
    }
}
