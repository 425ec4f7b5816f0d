use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use beacon_model::Role;
use tracing::{info, warn};

use crate::{
    models::{AgentConfig, BlobBackend, CoordinationBackend},
    util::{non_empty_var, parse_bool},
    validation,
};

pub const CONFIG_PATH_VAR: &str = "BEACON_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "BEACON_CONFIG_JSON";
pub const DISABLED_VAR: &str = "USAGE_REPORT_DISABLED";
pub const ROLE_VAR: &str = "USAGE_REPORT_ROLE";

const DEFAULT_CANDIDATES: &[&str] = &[
    "beacon.toml",
    "beacon.json",
    "config/beacon.toml",
    "config/beacon.json",
];

/// Source that produced the agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// A loaded, validated configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: AgentConfig,
    pub source: ConfigSource,
    /// Environment variables that overrode loaded values.
    pub overrides: Vec<&'static str>,
}

/// Resolves the agent configuration.
///
/// Evaluation order:
/// 1) `$BEACON_CONFIG_PATH` (TOML or JSON file),
/// 2) `$BEACON_CONFIG_JSON` (inline JSON),
/// 3) the first existing default file under the base directory,
/// 4) defaults.
///
/// `$USAGE_REPORT_DISABLED` and `$USAGE_REPORT_ROLE` are applied on top.
pub struct ConfigLoader<F> {
    lookup: F,
    base_dir: PathBuf,
}

impl<F> std::fmt::Debug for ConfigLoader<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

impl ConfigLoader<fn(&str) -> Option<String>> {
    /// Loader reading the process environment, relative to the working
    /// directory.
    pub fn from_env() -> anyhow::Result<Self> {
        let base_dir = env::current_dir().context("failed to resolve working directory")?;
        Ok(Self::new(process_env, base_dir))
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            lookup,
            base_dir: base_dir.into(),
        }
    }

    pub fn load(&self) -> anyhow::Result<ConfigLoad> {
        let (mut config, source) = self.load_base()?;
        let overrides = self.apply_overrides(&mut config)?;
        validation::validate(&config)
            .with_context(|| format!("invalid configuration from {}", describe(&source)))?;

        if !config.is_disabled() {
            if config.coordination == CoordinationBackend::Memory {
                warn!(
                    target: "usage::config",
                    "memory coordination store only elects within this process"
                );
            }
            if config.blob == BlobBackend::Memory {
                warn!(
                    target: "usage::config",
                    "memory blob store does not survive restarts"
                );
            }
        }
        info!(
            target: "usage::config",
            source = %describe(&source),
            overrides = ?overrides,
            disabled = config.is_disabled(),
            role = %config.usage_report.role,
            "usage report configuration loaded"
        );

        Ok(ConfigLoad {
            config,
            source,
            overrides,
        })
    }

    fn load_base(&self) -> anyhow::Result<(AgentConfig, ConfigSource)> {
        if let Some(raw) = non_empty_var(&self.lookup, CONFIG_PATH_VAR) {
            let path = self.resolve(Path::new(raw.trim()));
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = non_empty_var(&self.lookup, CONFIG_JSON_VAR) {
            let parsed =
                parse_json(&raw).with_context(|| format!("failed to parse {CONFIG_JSON_VAR}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((AgentConfig::default(), ConfigSource::Default))
    }

    fn apply_overrides(&self, config: &mut AgentConfig) -> anyhow::Result<Vec<&'static str>> {
        let mut applied = Vec::new();

        if let Some(raw) = non_empty_var(&self.lookup, DISABLED_VAR) {
            config.usage_report.disabled = parse_bool(&raw)
                .ok_or_else(|| anyhow!("{DISABLED_VAR} must be a boolean, got '{raw}'"))?;
            applied.push(DISABLED_VAR);
        }

        if let Some(raw) = non_empty_var(&self.lookup, ROLE_VAR) {
            config.usage_report.role = raw
                .parse::<Role>()
                .with_context(|| format!("invalid {ROLE_VAR}"))?;
            applied.push(ROLE_VAR);
        }

        Ok(applied)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| self.base_dir.join(candidate))
            .find(|path| path.is_file())
    }
}

pub fn load_from_file(path: &Path) -> anyhow::Result<AgentConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read agent config from {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents)
            .with_context(|| format!("invalid agent config {}", path.display())),
        Some("toml") | Some("tml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid agent config {}: {}", path.display(), err)),
        _ => parse_from_str(&contents, &path.display().to_string()),
    }
}

pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<AgentConfig> {
    // Try TOML first, then JSON.
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse agent config {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<AgentConfig> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid agent config json: {err}"))
}

fn describe(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Default => "defaults".to_string(),
        ConfigSource::EnvPath(path) => format!("{CONFIG_PATH_VAR}={}", path.display()),
        ConfigSource::EnvInline => CONFIG_JSON_VAR.to_string(),
        ConfigSource::File(path) => path.display().to_string(),
    }
}
