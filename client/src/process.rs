//! Process supervisor for the analysis server.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tsbridge_types::{ProtocolVersion, VersionParseError};

const STOP_GRACE: Duration = Duration::from_secs(2);

const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("{program} not found in PATH")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },
    #[error("spawning {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} started without a {stream} pipe")]
    MissingPipe {
        program: String,
        stream: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("{program} --version did not finish in time")]
    Timeout { program: String },
    #[error(transparent)]
    Parse(#[from] VersionParseError),
}

/// How to launch the server.
#[derive(Debug, Clone, Default)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Append `--locale=<locale>` unless the options already carry one.
    #[must_use]
    pub fn locale(mut self, locale: Option<&str>) -> Self {
        if let Some(locale) = locale.filter(|l| !l.is_empty())
            && !self.args.iter().any(|a| a.starts_with("--locale"))
        {
            self.args.push(format!("--locale={locale}"));
        }
        self
    }
}

/// Stdio of a freshly spawned server, handed to the correlator.
#[derive(Debug)]
pub struct ServerIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// A running server child process.
#[derive(Debug)]
pub struct ServerProcess {
    program: String,
    child: Option<Child>,
}

impl ServerProcess {
    /// Launch the server with piped stdio.
    ///
    /// On Unix the child gets its own process group so terminal signals
    /// aimed at the editor don't reach it. On Windows the program is run
    /// through `cmd /C` because npm installs batch-file shims.
    pub fn start(command: &ServerCommand) -> Result<(Self, ServerIo), SpawnError> {
        let resolved = which::which(&command.program).map_err(|source| SpawnError::NotFound {
            program: command.program.clone(),
            source,
        })?;

        let mut cmd = platform_command(&resolved, &command.args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
            program: command.program.clone(),
            source,
        })?;

        let missing = |stream| SpawnError::MissingPipe {
            program: command.program.clone(),
            stream,
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let program = command.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %program, "stderr: {line}");
                }
            });
        }

        tracing::info!(
            server = %command.program,
            path = %resolved.display(),
            pid = child.id(),
            args = ?command.args,
            "Analysis server started"
        );

        Ok((
            Self {
                program: command.program.clone(),
                child: Some(child),
            },
            ServerIo { stdin, stdout },
        ))
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.child.is_none()
    }

    /// Exit status if the child has already exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.as_mut()?.try_wait().ok().flatten()
    }

    /// Terminate the child. Calling this again is a no-op.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(server = %self.program, %status, "Analysis server already exited");
            return;
        }
        terminate(&mut child);

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(server = %self.program, %status, "Analysis server stopped");
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.program, "Waiting for analysis server failed: {e}");
            }
            Err(_) => {
                tracing::warn!(server = %self.program, "Analysis server ignored SIGTERM; killing");
                let _ = child.kill().await;
            }
        }
    }
}

#[cfg(unix)]
fn platform_command(program: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args).process_group(0);
    cmd
}

#[cfg(windows)]
fn platform_command(program: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(program).args(args);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id() {
        Some(pid) => {
            // SAFETY: plain kill(2) on a pid we spawned and have not reaped.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc == -1 {
                let _ = child.start_kill();
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(windows)]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// The compiler binary that ships next to a server binary (`tsserver` → `tsc`).
#[must_use]
pub fn compiler_path_for(server_path: &str) -> String {
    match server_path.rfind("tsserver") {
        Some(idx) => {
            let mut path = server_path.to_string();
            path.replace_range(idx..idx + "tsserver".len(), "tsc");
            path
        }
        None => "tsc".to_string(),
    }
}

/// Ask the compiler that ships with `server_path` for its version.
pub async fn query_version(server_path: &str) -> Result<ProtocolVersion, VersionError> {
    let program = compiler_path_for(server_path);
    let resolved = which::which(&program).map_err(|source| SpawnError::NotFound {
        program: program.clone(),
        source,
    })?;

    let mut cmd = platform_command(&resolved, &["--version".to_string()]);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(VERSION_QUERY_TIMEOUT, cmd.output())
        .await
        .map_err(|_| VersionError::Timeout {
            program: program.clone(),
        })?
        .map_err(|source| SpawnError::Io {
            program: program.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = ProtocolVersion::parse_version_output(&stdout)?;
    tracing::debug!(compiler = %program, %version, "Queried server version");
    Ok(version)
}

/// Locale for `--locale`, from the usual environment variables.
///
/// `en_US.UTF-8` becomes `en`.
#[must_use]
pub fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG", "LANGUAGE"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .and_then(|raw| normalize_locale(&raw))
}

fn normalize_locale(raw: &str) -> Option<String> {
    let lang = raw.split(['.', ':', '_']).next().unwrap_or_default();
    // The POSIX default carries no language.
    if lang.is_empty() || lang == "C" || lang == "POSIX" {
        return None;
    }
    Some(lang.to_string())
}
