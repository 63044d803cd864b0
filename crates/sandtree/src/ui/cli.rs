//! Command line entry points.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::app::bootstrap::{Bootstrap, Phase};
use crate::app::explorer::render_rows;
use crate::app::sync::{SandboxSync, snapshot_from_sandbox};
use crate::app::workspace::Workspace;
use crate::infra::config::Config;
use crate::infra::runtime::SandboxRuntime;
use crate::infra::sandbox::{LocalBooter, LocalSandbox};
use crate::infra::templates::{
    JsonTemplateStore, Privacy, TemplateKind, TemplateRecord, TemplateStore, create_template,
};

#[derive(Parser)]
#[command(author, version, about = "Project trees for sandboxed web IDE sessions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk a directory and print it in the persisted tree format
    Snapshot {
        dir: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
    /// Manage saved templates
    Templates {
        #[command(subcommand)]
        command: TemplatesCommand,
    },
    /// Load a template into a local sandbox and start its dev server
    Open {
        id: String,
        /// Host directory used as the sandbox root
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Stop after loading the tree instead of waiting for Ctrl-C
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Subcommand)]
enum TemplatesCommand {
    New {
        name: String,
        #[arg(long, value_enum)]
        kind: TemplateKind,
        #[arg(long)]
        owner: String,
        #[arg(long, value_enum, default_value_t = Privacy::Private)]
        privacy: Privacy,
    },
    List {
        #[arg(long)]
        owner: String,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Snapshot { dir, pretty } => snapshot(dir, pretty).await,
            Command::Templates { command } => {
                let config = Config::load()?;
                let store = JsonTemplateStore::new(config.data_dir());
                templates(&store, command).await
            }
            Command::Open {
                id,
                workdir,
                no_wait,
            } => open(id, workdir, no_wait).await,
        }
    }
}

async fn snapshot(dir: PathBuf, pretty: bool) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let sandbox = LocalSandbox::new(&dir);
    let tree = snapshot_from_sandbox(&sandbox, "/")
        .await
        .with_context(|| format!("failed to read {}", dir.display()))?;
    let json = if pretty {
        serde_json::to_string_pretty(&tree)?
    } else {
        tree.to_json()?
    };
    writeln!(io::stdout(), "{json}")?;
    Ok(())
}

async fn templates(store: &dyn TemplateStore, command: TemplatesCommand) -> Result<()> {
    let mut out = io::stdout();
    match command {
        TemplatesCommand::New {
            name,
            kind,
            owner,
            privacy,
        } => {
            let record = create_template(store, &owner, &name, kind, privacy).await?;
            writeln!(out, "{}", record.id)?;
        }
        TemplatesCommand::List { owner } => {
            for record in store.list(&owner).await? {
                writeln!(out, "{}", summary_line(&record))?;
            }
        }
        TemplatesCommand::Show { id } => {
            let record = store.fetch(&id).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
        }
        TemplatesCommand::Delete { id } => {
            store.delete(&id).await?;
            writeln!(out, "deleted {id}")?;
        }
    }
    Ok(())
}

fn summary_line(record: &TemplateRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        record.id, record.kind, record.name, record.privacy
    )
}

async fn open(id: String, workdir: Option<PathBuf>, no_wait: bool) -> Result<()> {
    let config = Config::load()?;
    let store: Arc<dyn TemplateStore> = Arc::new(JsonTemplateStore::new(config.data_dir()));
    let mut workspace = Workspace::new(store);
    let kind = workspace.load(&id).await?.kind;

    if !kind.is_tree() {
        print_workspace(&workspace)?;
        return Ok(());
    }

    let root = workdir.unwrap_or_else(|| config.sandbox_root());
    let runtime = SandboxRuntime::new(Arc::new(LocalBooter::new(root)));
    let sandbox = runtime.acquire().await.context("failed to boot the sandbox")?;
    let sync = SandboxSync::new(sandbox, config.sandbox.mount_point.clone());

    let booted = Bootstrap::new(&sync, &config.commands)
        .on_phase(|phase| eprintln!("{}", phase_label(phase)))
        .run(&mut workspace)
        .await?;
    workspace.attach_sandbox(sync)?;
    print_workspace(&workspace)?;

    if !no_wait {
        let mut ready = booted.server_ready;
        let dev_server = tokio::spawn(booted.dev_server.wait());
        tokio::select! {
            event = ready.recv() => {
                if let Ok(event) = event {
                    eprintln!("server ready at {}", event.url);
                }
                tokio::signal::ctrl_c().await?;
            }
            _ = tokio::signal::ctrl_c() => {}
        }
        dev_server.abort();
    }

    let saved = workspace.save().await?;
    eprintln!("saved {}", saved.id);
    workspace.detach_sandbox().await;
    runtime.teardown().await;
    Ok(())
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Mounting => "Mounting saved project",
        Phase::Scaffolding => "Creating Vite project",
        Phase::Installing => "Installing dependencies",
        Phase::Loading => "Reading project tree",
        Phase::Starting => "Starting Vite development server",
    }
}

fn print_workspace(workspace: &Workspace) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", render_rows(&workspace.visible_rows()))?;
    if let Some(file) = workspace.store().active_file() {
        writeln!(out)?;
        writeln!(out, "{}", file.contents)?;
    }
    Ok(())
}
