//! Configuration for tsbridge.
//!
//! Read from `~/.tsbridge/config.toml`. Every section is optional and a
//! missing file means defaults. Editor variables (`tsbridge#...`) override
//! file values after loading; see [`BridgeConfig::apply_var`].

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use serde_json::Value;
use tsbridge_types::ProtocolVersion;

// Default value functions for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

fn default_server_path() -> String {
    "tsserver".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

const fn default_max_detail() -> usize {
    25
}

/// Editor variables that override file settings.
pub const VAR_SERVER_PATH: &str = "tsbridge#server_path";
pub const VAR_SERVER_OPTIONS: &str = "tsbridge#server_options";
pub const VAR_MAX_COMPLETION_DETAIL: &str = "tsbridge#max_completion_detail";
pub const VAR_DIAGNOSTICS_ENABLE: &str = "tsbridge#diagnostics_enable";

pub const HOST_VARS: [&str; 4] = [
    VAR_SERVER_PATH,
    VAR_SERVER_OPTIONS,
    VAR_MAX_COMPLETION_DETAIL,
    VAR_DIAGNOSTICS_ENABLE,
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("editing {}: {source}", path.display())]
    Edit {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no home directory to hold the config file")]
    NoHome,
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Edit { path, .. }
            | ConfigError::Write { path, .. } => Some(path),
            ConfigError::NoHome => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server binary. `${VAR}` references are expanded.
    #[serde(default = "default_server_path")]
    pub path: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Message language. Derived from the environment when unset.
    #[serde(default)]
    pub locale: Option<String>,
    /// Per-request deadline. `0` disables it.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Skip the version query and assume this version.
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: default_server_path(),
            options: Vec::new(),
            locale: None,
            request_timeout_ms: default_request_timeout_ms(),
            version: None,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn resolved_path(&self) -> String {
        expand_env_vars(&self.path)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// The configured version override, if it parses.
    #[must_use]
    pub fn version_override(&self) -> Option<ProtocolVersion> {
        let raw = self.version.as_deref()?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Ignoring server.version override: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    /// Above this many candidates, details are not fetched.
    #[serde(default = "default_max_detail")]
    pub max_detail: usize,
    /// Display text per completion kind, e.g. `function = "λ"`.
    #[serde(default)]
    pub kind_symbols: HashMap<String, String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_detail: default_max_detail(),
            kind_symbols: HashMap::new(),
        }
    }
}

impl CompletionConfig {
    #[must_use]
    pub fn kind_symbol<'a>(&'a self, kind: &'a str) -> &'a str {
        self.kind_symbols.get(kind).map_or(kind, String::as_str)
    }
}

/// What happens to a file's diagnostics when its buffer closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Keep the set (and its markers) for the rest of the session.
    #[default]
    Retain,
    /// Clear the markers and drop the set.
    OnBufferClose,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignConfig {
    pub name: String,
    pub text: String,
    pub texthl: String,
}

impl SignConfig {
    fn new(name: &str, text: &str, texthl: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            texthl: texthl.to_string(),
        }
    }
}

#[must_use]
pub fn default_signs() -> Vec<SignConfig> {
    vec![
        SignConfig::new("TSerror", "•", "ErrorMsg"),
        SignConfig::new("TSwarning", "•", "WarningMsg"),
        SignConfig::new("TSsuggestion", "•", "Comment"),
        SignConfig::new("TSmessage", "•", "MoreMsg"),
        SignConfig::new("TSunknown", "•", "Comment"),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub include_suggestions: bool,
    #[serde(default)]
    pub eviction: EvictionPolicy,
    #[serde(default = "default_signs")]
    pub signs: Vec<SignConfig>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            include_suggestions: false,
            eviction: EvictionPolicy::default(),
            signs: default_signs(),
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(close) if close > 0 => {
                out.push_str(&env::var(&after[..close]).unwrap_or_default());
                rest = &after[close + 1..];
            }
            _ => {
                // Unclosed or empty: keep the text as written.
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

impl BridgeConfig {
    /// Load `~/.tsbridge/config.toml`. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        toml::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {}: {err}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Apply one editor variable. Returns whether it was recognised and valid.
    pub fn apply_var(&mut self, name: &str, value: &Value) -> bool {
        let applied = match name {
            VAR_SERVER_PATH => value
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| self.server.path = s.to_string())
                .is_some(),
            VAR_SERVER_OPTIONS => match value.as_array() {
                Some(items) => {
                    self.server.options = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    true
                }
                None => false,
            },
            VAR_MAX_COMPLETION_DETAIL => value_as_usize(value)
                .map(|n| self.completion.max_detail = n)
                .is_some(),
            VAR_DIAGNOSTICS_ENABLE => match value {
                Value::Bool(b) => {
                    self.diagnostics.enable = *b;
                    true
                }
                Value::Number(n) => {
                    self.diagnostics.enable = n.as_i64().unwrap_or(0) != 0;
                    true
                }
                _ => false,
            },
            _ => false,
        };
        if !applied {
            tracing::debug!(name, %value, "Ignoring editor variable");
        }
        applied
    }

    /// Persist `[server] path`, keeping the rest of the file intact.
    pub fn persist_server_path(server_path: &str) -> Result<PathBuf, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoHome)?;
        persist_server_path_to(&path, server_path)?;
        Ok(path)
    }
}

/// Vim numbers may arrive as integers, floats or numeric strings.
fn value_as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as usize),
        _ => None,
    }
}

/// Set `[server] path` in the file at `path`, creating it if needed.
///
/// Uses `toml_edit` so comments and formatting survive. The new content is
/// written to a temporary file in the same directory and renamed into place.
pub fn persist_server_path_to(path: &Path, server_path: &str) -> Result<(), ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;

    let content = if path.exists() {
        fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|source| ConfigError::Edit {
            path: path.to_path_buf(),
            source,
        })?;
    if !doc.contains_key("server") {
        doc["server"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc["server"]["path"] = toml_edit::value(server_path);

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(doc.to_string().as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tsbridge").join("config.toml"))
}

/// Directory for the log file.
pub fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tsbridge").join("logs"))
}
