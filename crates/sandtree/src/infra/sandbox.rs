//! Sandbox runtime capability and a host-directory implementation of it.
//!
//! The sandbox is an opaque execution environment: it spawns processes,
//! exposes a file system addressed by absolute slash paths, mounts whole
//! trees and announces development servers once they listen.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;

use crate::domain::errors::SandboxError;
use crate::domain::model::{Entry, Tree};
use crate::domain::path;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B\[[0-9;]*[A-Za-z]").expect("valid ansi regex"));
static SERVER_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0):(\d+)/?")
        .expect("valid server url regex")
});

/// Type of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    File,
    Directory,
    Other,
}

/// One entry of [`Sandbox::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: DirEntryKind,
}

impl DirEntryInfo {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == DirEntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == DirEntryKind::Directory
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Working directory inside the sandbox; the sandbox root when unset.
    pub cwd: Option<String>,
}

impl SpawnOptions {
    pub fn in_dir(cwd: impl Into<String>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }
}

/// Emitted when a process inside the sandbox starts listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Handle on a spawned process: merged output chunks and its exit code.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub output: mpsc::UnboundedReceiver<String>,
    pub exit: oneshot::Receiver<i32>,
}

impl SpawnedProcess {
    /// Forward the output to the debug log and wait for the exit code.
    pub async fn wait(mut self) -> Result<i32, SandboxError> {
        while let Some(chunk) = self.output.recv().await {
            tracing::debug!(target: "sandtree::process", "{}", chunk.trim_end());
        }
        self.exit
            .await
            .map_err(|_| SandboxError::failed("wait", "", "process handle dropped"))
    }

    /// Collect the whole output and the exit code.
    pub async fn collect(mut self) -> Result<(String, i32), SandboxError> {
        let mut text = String::new();
        while let Some(chunk) = self.output.recv().await {
            text.push_str(&chunk);
        }
        let code = self
            .exit
            .await
            .map_err(|_| SandboxError::failed("wait", "", "process handle dropped"))?;
        Ok((text, code))
    }
}

/// The capability the tree model consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn spawn(
        &self,
        command: &str,
        args: Vec<String>,
        options: SpawnOptions,
    ) -> Result<SpawnedProcess, SandboxError>;

    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), SandboxError>;

    /// Read a file as UTF-8 text.
    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntryInfo>, SandboxError>;

    async fn remove(&self, path: &str, recursive: bool) -> Result<(), SandboxError>;

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), SandboxError>;

    /// Move `from` to `to`, keeping everything below it.
    async fn rename(&self, from: &str, to: &str) -> Result<(), SandboxError>;

    /// Materialize `tree` below `mount_point`.
    async fn mount(&self, tree: &Tree, mount_point: &str) -> Result<(), SandboxError>;

    /// Subscribe to `server-ready` announcements.
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;

    /// Stop every process and release the runtime.
    async fn teardown(&self);
}

/// Produces sandbox handles. Booting may be slow; see
/// [`SandboxRuntime`](crate::infra::runtime::SandboxRuntime) for the guard
/// around it.
#[async_trait]
pub trait SandboxBooter: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

/// Runs the sandbox capability against a host directory. Sandbox paths are
/// re-rooted below it (`/my-app/a.js` → `<root>/my-app/a.js`).
#[derive(Debug)]
pub struct LocalSandbox {
    root: PathBuf,
    ready: broadcast::Sender<ServerReady>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (ready, _) = broadcast::channel(16);
        Self {
            root: root.into(),
            ready,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, sandbox_path: &str) -> Result<PathBuf, SandboxError> {
        let relative = Path::new(sandbox_path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SandboxError::failed(
                "resolve",
                sandbox_path,
                "path escapes the sandbox root",
            ));
        }
        Ok(self.root.join(relative))
    }

    fn track(&self, handle: AbortHandle) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn spawn(
        &self,
        command: &str,
        args: Vec<String>,
        options: SpawnOptions,
    ) -> Result<SpawnedProcess, SandboxError> {
        let cwd = self.host_path(options.cwd.as_deref().unwrap_or("/"))?;
        let mut child = Command::new(command)
            .args(&args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SandboxError::failed("spawn", command, err))?;

        tracing::debug!(%command, ?args, cwd = %cwd.display(), "process spawned");

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        if let Some(stdout) = child.stdout.take() {
            let task = tokio::spawn(pump_output(stdout, output_tx.clone(), self.ready.clone()));
            self.track(task.abort_handle());
        }
        if let Some(stderr) = child.stderr.take() {
            let task = tokio::spawn(pump_output(stderr, output_tx, self.ready.clone()));
            self.track(task.abort_handle());
        }

        let waiter = tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to wait for process");
                    -1
                }
            };
            let _ = exit_tx.send(code);
        });
        self.track(waiter.abort_handle());

        Ok(SpawnedProcess {
            output: output_rx,
            exit: exit_rx,
        })
    }

    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), SandboxError> {
        let host = self.host_path(path)?;
        tokio::fs::write(&host, bytes)
            .await
            .map_err(|err| SandboxError::failed("write", path, err))
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let host = self.host_path(path)?;
        let bytes = tokio::fs::read(&host)
            .await
            .map_err(|err| SandboxError::failed("read", path, err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntryInfo>, SandboxError> {
        let host = self.host_path(path)?;
        let mut reader = tokio::fs::read_dir(&host)
            .await
            .map_err(|err| SandboxError::failed("readdir", path, err))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| SandboxError::failed("readdir", path, err))?
        {
            let kind = match entry.file_type().await {
                Ok(ft) if ft.is_file() => DirEntryKind::File,
                Ok(ft) if ft.is_dir() => DirEntryKind::Directory,
                _ => DirEntryKind::Other,
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        let host = self.host_path(path)?;
        let metadata = tokio::fs::metadata(&host)
            .await
            .map_err(|err| SandboxError::failed("rm", path, err))?;
        let result = if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&host).await
            } else {
                tokio::fs::remove_dir(&host).await
            }
        } else {
            tokio::fs::remove_file(&host).await
        };
        result.map_err(|err| SandboxError::failed("rm", path, err))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        let host = self.host_path(path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(&host).await
        } else {
            tokio::fs::create_dir(&host).await
        };
        result.map_err(|err| SandboxError::failed("mkdir", path, err))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SandboxError> {
        let source = self.host_path(from)?;
        let target = self.host_path(to)?;
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(SandboxError::failed("rename", to, "destination exists"));
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|err| SandboxError::failed("rename", from, err))
    }

    async fn mount(&self, tree: &Tree, mount_point: &str) -> Result<(), SandboxError> {
        self.mkdir(mount_point, true).await?;
        for (relative, entry) in flatten(tree) {
            let target = path::join(mount_point, &relative);
            match entry {
                Entry::Directory(_) => self.mkdir(&target, true).await?,
                Entry::File(file) => {
                    self.write_file(&target, file.contents.clone().into_bytes())
                        .await?
                }
            }
        }
        tracing::debug!(%mount_point, entries = tree.entry_count(), "tree mounted");
        Ok(())
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready.subscribe()
    }

    async fn teardown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.abort();
        }
        tracing::debug!(root = %self.root.display(), "local sandbox torn down");
    }
}

/// Boots [`LocalSandbox`] handles rooted at a host directory.
#[derive(Debug, Clone)]
pub struct LocalBooter {
    root: PathBuf,
}

impl LocalBooter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxBooter for LocalBooter {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| SandboxError::failed("boot", self.root.display().to_string(), err))?;
        tracing::info!(root = %self.root.display(), "local sandbox booted");
        Ok(Arc::new(LocalSandbox::new(self.root.clone())))
    }
}

/// Parents come before their children.
fn flatten(tree: &Tree) -> Vec<(String, &Entry)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Entry)> = tree
        .root()
        .iter()
        .rev()
        .map(|(name, entry)| (name.to_owned(), entry.as_ref()))
        .collect();
    while let Some((relative, entry)) = stack.pop() {
        if let Entry::Directory(dir) = entry {
            for (name, child) in dir.iter().rev() {
                stack.push((path::join(&relative, name), child.as_ref()));
            }
        }
        out.push((relative, entry));
    }
    out
}

async fn pump_output<R>(
    reader: R,
    output: mpsc::UnboundedSender<String>,
    ready: broadcast::Sender<ServerReady>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut announced = false;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !announced && let Some(event) = parse_server_ready(&line) {
                    announced = true;
                    tracing::info!(port = event.port, url = %event.url, "server ready");
                    let _ = ready.send(event);
                }
                // Keep draining after the receiver is gone so the child never blocks.
                let _ = output.send(format!("{line}\n"));
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read process output");
                break;
            }
        }
    }
}

/// Find a local server URL in one line of process output.
pub fn parse_server_ready(line: &str) -> Option<ServerReady> {
    let plain = ANSI_ESCAPE.replace_all(line, "");
    let captures = SERVER_URL.captures(&plain)?;
    let port = captures.get(1)?.as_str().parse().ok()?;
    Some(ServerReady {
        port,
        url: captures.get(0)?.as_str().to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Directory;

    #[test]
    fn detects_vite_banner() {
        let line = "  \u{1b}[32m➜\u{1b}[39m  \u{1b}[1mLocal\u{1b}[22m:   \u{1b}[36mhttp://localhost:\u{1b}[1m5173\u{1b}[22m/\u{1b}[39m";
        let event = parse_server_ready(line).unwrap();
        assert_eq!(event.port, 5173);
        assert_eq!(event.url, "http://localhost:5173/");
        assert!(parse_server_ready("added 200 packages in 3s").is_none());
    }

    #[tokio::test]
    async fn mount_and_list_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(temp.path());
        let tree = Tree::from_root(
            Directory::new()
                .with_file("package.json", "{}")
                .with_dir("src", Directory::new().with_file("main.js", "run()"))
                .with_dir("empty", Directory::new()),
        );

        sandbox.mount(&tree, "/my-app").await.unwrap();

        let entries = sandbox.read_dir("/my-app").await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntryInfo::directory("empty"),
                DirEntryInfo::file("package.json"),
                DirEntryInfo::directory("src"),
            ]
        );
        assert_eq!(
            sandbox.read_file("/my-app/src/main.js").await.unwrap(),
            "run()"
        );
    }

    #[tokio::test]
    async fn rejects_paths_outside_the_root() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(temp.path());
        let err = sandbox.read_file("/../etc/passwd").await.unwrap_err();
        assert!(matches!(err, SandboxError::OperationFailed { op: "resolve", .. }));
    }

    #[tokio::test]
    async fn remove_directory_recursively() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(temp.path());
        sandbox.mkdir("/my-app/src/deep", true).await.unwrap();
        sandbox
            .write_file("/my-app/src/deep/a.js", b"a".to_vec())
            .await
            .unwrap();

        sandbox.remove("/my-app/src", true).await.unwrap();
        assert!(!temp.path().join("my-app/src").exists());
        assert!(sandbox.remove("/my-app/src", true).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_process_reports_output_and_exit() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(temp.path());
        let mut ready = sandbox.server_ready();

        let process = sandbox
            .spawn(
                "sh",
                vec![
                    "-c".into(),
                    "echo 'Local: http://localhost:4000/'; exit 3".into(),
                ],
                SpawnOptions::default(),
            )
            .await
            .unwrap();
        let (output, code) = process.collect().await.unwrap();

        assert!(output.contains("localhost:4000"));
        assert_eq!(code, 3);
        assert_eq!(ready.recv().await.unwrap().port, 4000);
    }

    #[tokio::test]
    async fn rename_moves_subtree_and_refuses_to_clobber() {
        let temp = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(temp.path());
        sandbox.mkdir("/my-app/dist", true).await.unwrap();
        sandbox
            .write_file("/my-app/dist/bundle.js", b"built".to_vec())
            .await
            .unwrap();
        sandbox.mkdir("/my-app/taken", true).await.unwrap();

        assert!(sandbox.rename("/my-app/dist", "/my-app/taken").await.is_err());
        sandbox.rename("/my-app/dist", "/my-app/out").await.unwrap();
        assert_eq!(
            sandbox.read_file("/my-app/out/bundle.js").await.unwrap(),
            "built"
        );
        assert!(sandbox.read_dir("/my-app/dist").await.is_err());
    }
}
