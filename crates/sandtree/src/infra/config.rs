//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::{config_dir, data_dir};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".sandtree/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub commands: Commands,
    #[serde(default)]
    pub storage: Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Absolute sandbox directory the project tree is mounted at.
    #[serde(default = "SandboxSettings::default_mount_point")]
    pub mount_point: String,
    /// Host directory backing the local sandbox.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl SandboxSettings {
    fn default_mount_point() -> String {
        "/my-app".into()
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            mount_point: Self::default_mount_point(),
            root: None,
        }
    }
}

/// Command lines run inside the sandbox, as argv arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commands {
    #[serde(default)]
    scaffold: Option<Vec<String>>,
    #[serde(default)]
    install: Option<Vec<String>>,
    #[serde(default)]
    dev: Option<Vec<String>>,
}

impl Commands {
    fn default_scaffold() -> Vec<String> {
        argv(&["npx", "--yes", "create-vite@latest", "my-app", "--template", "react"])
    }

    fn default_install() -> Vec<String> {
        argv(&["npm", "install"])
    }

    fn default_dev() -> Vec<String> {
        argv(&["npm", "run", "dev"])
    }

    pub fn scaffold(&self) -> Vec<String> {
        self.scaffold.clone().unwrap_or_else(Self::default_scaffold)
    }

    pub fn install(&self) -> Vec<String> {
        self.install.clone().unwrap_or_else(Self::default_install)
    }

    pub fn dev(&self) -> Vec<String> {
        self.dev.clone().unwrap_or_else(Self::default_dev)
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_owned()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    mount_point: Option<String>,
    data_dir: Option<PathBuf>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            mount_point: env::var("SANDTREE_MOUNT_POINT").ok(),
            data_dir: env::var_os("SANDTREE_DATA_DIR").map(PathBuf::from),
        }
    }

    #[cfg(test)]
    fn for_tests(mount_point: &str, data_dir: &str) -> Self {
        Self {
            mount_point: Some(mount_point.to_owned()),
            data_dir: Some(PathBuf::from(data_dir)),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            sandbox: merge_sandbox(self.sandbox, other.sandbox),
            commands: merge_commands(self.commands, other.commands),
            storage: Storage {
                data_dir: other.storage.data_dir.or(self.storage.data_dir),
            },
        }
    }

    /// Directory templates and the default sandbox root live under.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| data_dir().map(|base| base.join("sandtree")))
            .unwrap_or_else(|| PathBuf::from(".sandtree"))
    }

    /// Host directory backing the local sandbox.
    pub fn sandbox_root(&self) -> PathBuf {
        self.sandbox
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir().join("sandbox"))
    }
}

fn merge_sandbox(base: SandboxSettings, overlay: SandboxSettings) -> SandboxSettings {
    SandboxSettings {
        mount_point: if overlay.mount_point != SandboxSettings::default_mount_point() {
            overlay.mount_point
        } else {
            base.mount_point
        },
        root: overlay.root.or(base.root),
    }
}

fn merge_commands(mut base: Commands, overlay: Commands) -> Commands {
    if let Some(value) = overlay.scaffold {
        base.scaffold = Some(value);
    }
    if let Some(value) = overlay.install {
        base.install = Some(value);
    }
    if let Some(value) = overlay.dev {
        base.dev = Some(value);
    }
    base
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("sandtree/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(mount_point) = env.mount_point {
        config.sandbox.mount_point = mount_point;
    }
    if let Some(data_dir) = env.data_dir {
        config.storage.data_dir = Some(data_dir);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_uses_defaults_when_no_files() {
        let config = Config::load_with_layers(None, None, EnvOverrides::default())
            .expect("load default config");
        assert_eq!(config.sandbox.mount_point, "/my-app");
        assert_eq!(config.commands.install(), ["npm", "install"]);
        assert_eq!(config.commands.dev(), ["npm", "run", "dev"]);
        assert_eq!(config.commands.scaffold()[0], "npx");
    }

    #[test]
    fn merge_global_and_workspace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let global = temp.path().join("config.toml");
        fs::write(
            &global,
            r#"
[sandbox]
mount_point = "/workspace"
[commands]
install = ["pnpm", "install"]
"#,
        )?;

        let workspace_dir = temp.path().join("repo");
        fs::create_dir_all(workspace_dir.join(".sandtree"))?;
        fs::create_dir_all(workspace_dir.join(".git"))?;
        fs::write(
            workspace_dir.join(".sandtree/config.toml"),
            r#"
[commands]
dev = ["pnpm", "dev"]
[storage]
data_dir = "/tmp/sandtree-data"
"#,
        )?;

        let global_path = Some(global);
        let workspace_path = Some(workspace_dir.join(".sandtree/config.toml"));

        let config =
            Config::load_with_layers(global_path, workspace_path, EnvOverrides::default())?;

        assert_eq!(config.sandbox.mount_point, "/workspace");
        assert_eq!(config.commands.install(), ["pnpm", "install"]);
        assert_eq!(config.commands.dev(), ["pnpm", "dev"]);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/sandtree-data"));
        assert_eq!(
            config.sandbox_root(),
            PathBuf::from("/tmp/sandtree-data/sandbox")
        );
        assert_eq!(find_repo_root(&workspace_dir.join(".sandtree")), Some(workspace_dir));

        Ok(())
    }

    #[test]
    fn env_overrides_take_precedence() -> Result<()> {
        let overrides = EnvOverrides::for_tests("/srv/app", "/var/lib/sandtree");
        let config = Config::load_with_layers(None, None, overrides)?;
        assert_eq!(config.sandbox.mount_point, "/srv/app");
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/sandtree"));
        Ok(())
    }

    #[test]
    fn invalid_config_returns_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("broken.toml");
        fs::write(&file, "this is not toml")?;
        let result = Config::from_file(&file);
        assert!(result.is_err());
        Ok(())
    }
}
