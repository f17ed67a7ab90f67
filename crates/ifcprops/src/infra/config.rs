//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".ifcprops/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub remote: Remote,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resolution {
    #[serde(default)]
    concurrency: Option<usize>,
}

impl Resolution {
    fn default_concurrency() -> usize {
        1
    }

    /// Maximum number of property lookups in flight, never below one.
    pub fn concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(Self::default_concurrency)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Export {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    selection_file: Option<String>,
    #[serde(default)]
    bulk_file: Option<String>,
    #[serde(default)]
    pretty: Option<bool>,
    #[serde(default)]
    template: Option<String>,
}

impl Export {
    fn default_format() -> &'static str {
        "json"
    }

    fn default_selection_file() -> &'static str {
        "selectedElementData.json"
    }

    fn default_bulk_file() -> &'static str {
        "modelElementData.json"
    }

    fn default_template() -> &'static str {
        "element_report"
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or(Self::default_format())
    }

    /// File name used when exporting the current selection.
    pub fn selection_file(&self) -> &str {
        self.selection_file
            .as_deref()
            .unwrap_or(Self::default_selection_file())
    }

    /// File name used when exporting every element of the model.
    pub fn bulk_file(&self) -> &str {
        self.bulk_file.as_deref().unwrap_or(Self::default_bulk_file())
    }

    pub fn pretty(&self) -> bool {
        self.pretty.unwrap_or(true)
    }

    pub fn template(&self) -> String {
        self.template
            .clone()
            .unwrap_or_else(|| Self::default_template().to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Remote {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl Remote {
    fn default_base_url() -> &'static str {
        "http://127.0.0.1:5000"
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    /// Base URL of the analysis service.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(Self::default_base_url())
    }

    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.base_url = Some(url.into());
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(Self::default_timeout_secs())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs().max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Logging {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    tree: Option<bool>,
}

impl Logging {
    fn default_level() -> &'static str {
        "info"
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(Self::default_level())
    }

    /// Whether to use hierarchical output.
    pub fn tree(&self) -> bool {
        self.tree.unwrap_or(false)
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    remote_url: Option<String>,
    concurrency: Option<String>,
    log_level: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            remote_url: env::var("IFCPROPS_REMOTE_URL").ok(),
            concurrency: env::var("IFCPROPS_CONCURRENCY").ok(),
            log_level: env::var("IFCPROPS_LOG").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(remote_url: &str, concurrency: &str, log_level: &str) -> Self {
        Self {
            remote_url: Some(remote_url.to_owned()),
            concurrency: Some(concurrency.to_owned()),
            log_level: Some(log_level.to_owned()),
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

    /// Parse the built-in defaults only.
    pub fn builtin() -> Result<Self> {
        Self::from_str(&DEFAULT_CONFIG)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::builtin()?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        apply_env_overrides(merged, env_overrides)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            resolution: merge_resolution(self.resolution, other.resolution),
            export: merge_export(self.export, other.export),
            remote: merge_remote(self.remote, other.remote),
            logging: merge_logging(self.logging, other.logging),
        }
    }
}

fn merge_resolution(mut base: Resolution, overlay: Resolution) -> Resolution {
    if let Some(value) = overlay.concurrency {
        base.concurrency = Some(value);
    }
    base
}

fn merge_export(mut base: Export, overlay: Export) -> Export {
    if let Some(value) = overlay.format {
        base.format = Some(value);
    }
    if let Some(value) = overlay.selection_file {
        base.selection_file = Some(value);
    }
    if let Some(value) = overlay.bulk_file {
        base.bulk_file = Some(value);
    }
    if let Some(value) = overlay.pretty {
        base.pretty = Some(value);
    }
    if let Some(value) = overlay.template {
        base.template = Some(value);
    }
    base
}

fn merge_remote(mut base: Remote, overlay: Remote) -> Remote {
    if let Some(value) = overlay.base_url {
        base.base_url = Some(value);
    }
    if let Some(value) = overlay.timeout_secs {
        base.timeout_secs = Some(value);
    }
    base
}

fn merge_logging(mut base: Logging, overlay: Logging) -> Logging {
    if let Some(value) = overlay.level {
        base.level = Some(value);
    }
    if let Some(value) = overlay.tree {
        base.tree = Some(value);
    }
    base
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("ifcprops/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Result<Config> {
    if let Some(url) = env.remote_url {
        config.remote.set_base_url(url);
    }
    if let Some(concurrency) = env.concurrency {
        let value = concurrency
            .trim()
            .parse::<usize>()
            .with_context(|| format!("IFCPROPS_CONCURRENCY must be a number, got '{concurrency}'"))?;
        config.resolution.concurrency = Some(value);
    }
    if let Some(level) = env.log_level {
        config.logging.level = Some(level);
    }
    Ok(config)
}
