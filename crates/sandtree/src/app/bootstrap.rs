//! Brings a tree template up inside the sandbox: mount or scaffold, install
//! dependencies, load the tree and start the development server.

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use crate::app::sync::SandboxSync;
use crate::app::workspace::Workspace;
use crate::domain::path;
use crate::infra::config::Commands;
use crate::infra::sandbox::{ServerReady, SpawnOptions, SpawnedProcess};

/// Phases reported while bootstrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mounting,
    Scaffolding,
    Installing,
    Loading,
    Starting,
}

/// Outcome of a bootstrap run.
#[derive(Debug)]
pub struct Booted {
    /// Receives the dev server's `server-ready` announcements.
    pub server_ready: broadcast::Receiver<ServerReady>,
    /// The development server itself; dropping it stops forwarding its output.
    pub dev_server: SpawnedProcess,
    /// Whether the project was created from the scaffold command.
    pub scaffolded: bool,
}

/// Runs the bootstrap sequence for the workspace's loaded template.
pub struct Bootstrap<'a> {
    sync: &'a SandboxSync,
    commands: &'a Commands,
    on_phase: Box<dyn FnMut(Phase) + Send + 'a>,
}

impl<'a> Bootstrap<'a> {
    pub fn new(sync: &'a SandboxSync, commands: &'a Commands) -> Self {
        Self {
            sync,
            commands,
            on_phase: Box::new(|_| {}),
        }
    }

    /// Observe phase changes, e.g. to drive a progress line.
    pub fn on_phase(mut self, callback: impl FnMut(Phase) + Send + 'a) -> Self {
        self.on_phase = Box::new(callback);
        self
    }

    pub async fn run(mut self, workspace: &mut Workspace) -> Result<Booted> {
        let server_ready = self.sync.sandbox().server_ready();
        let mount = self.sync.sandbox_path("");

        let saved = workspace
            .template()
            .and_then(|record| record.file_system_tree.clone())
            .filter(|tree| !tree.is_empty());
        let scaffolded = saved.is_none();

        match saved {
            Some(tree) => {
                self.phase(Phase::Mounting);
                self.sync.mount(&tree).await.context("failed to mount saved tree")?;
            }
            None => {
                self.phase(Phase::Scaffolding);
                if let Err(err) = self.sync.sandbox().remove(&mount, true).await {
                    tracing::debug!(path = %mount, error = %err, "no previous project to remove");
                }
                let parent = path::parent_of(&mount)
                    .map(|parent| format!("/{parent}"))
                    .unwrap_or_else(|| "/".to_owned());
                self.run_to_exit("scaffold", &self.commands.scaffold(), &parent)
                    .await?;
            }
        }

        self.phase(Phase::Installing);
        self.run_to_exit("install", &self.commands.install(), &mount)
            .await?;

        self.phase(Phase::Loading);
        let tree = self
            .sync
            .snapshot()
            .await
            .context("failed to read the project back from the sandbox")?;
        tracing::info!(files = tree.files().len(), "project tree loaded");
        workspace.load_tree(tree);

        self.phase(Phase::Starting);
        let dev_server = self.spawn("dev", &self.commands.dev(), &mount).await?;

        Ok(Booted {
            server_ready,
            dev_server,
            scaffolded,
        })
    }

    fn phase(&mut self, phase: Phase) {
        tracing::info!(?phase, "bootstrap");
        (self.on_phase)(phase);
    }

    async fn spawn(&self, label: &str, argv: &[String], cwd: &str) -> Result<SpawnedProcess> {
        let (program, args) = argv
            .split_first()
            .with_context(|| format!("{label} command is empty"))?;
        self.sync
            .sandbox()
            .spawn(program, args.to_vec(), SpawnOptions::in_dir(cwd))
            .await
            .with_context(|| format!("failed to start {label} command `{}`", argv.join(" ")))
    }

    /// Run a command to completion. A non-zero exit is logged, not fatal.
    async fn run_to_exit(&self, label: &str, argv: &[String], cwd: &str) -> Result<()> {
        let process = self.spawn(label, argv, cwd).await?;
        let code = process
            .wait()
            .await
            .with_context(|| format!("{label} command did not report an exit code"))?;
        if code != 0 {
            tracing::warn!(command = label, code, "command exited with failure");
        }
        Ok(())
    }
}

/// Start the dev server again, e.g. after it crashed.
pub async fn restart_dev_server(sync: &SandboxSync, commands: &Commands) -> Result<SpawnedProcess> {
    let bootstrap = Bootstrap::new(sync, commands);
    bootstrap
        .spawn("dev", &commands.dev(), &sync.sandbox_path(""))
        .await
}
