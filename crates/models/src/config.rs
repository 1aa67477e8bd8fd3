use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, SupervisorError};
use crate::source::SourceRef;

/// Which build variant to run. Both variants share the same pipeline; the
/// helper stage is only executed (and wired into the runtime configuration)
/// for `WithHelper`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Plain,
    WithHelper,
}

impl Variant {
    pub fn includes_helper(&self) -> bool {
        matches!(self, Variant::WithHelper)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub variant: Variant,
    pub source: SourceConfig,
    pub install: InstallConfig,
    pub staging: StagingConfig,
    pub image: ImageConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub repo_url: String,
    pub git_ref: String,
    /// Dependency manifest path, relative to the snapshot root.
    pub manifest_path: String,
    /// Application entry script, relative to the snapshot root.
    pub entry_script: String,
    /// Subtree the native helper is compiled from, relative to the snapshot
    /// root. Excluded from the assembled application tree.
    pub helper_subtree: String,
    /// File name the helper binary is installed under in the image.
    pub helper_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
    /// Package identifiers removed from the dependency manifest before
    /// installation. Matched against parsed requirement names, not raw lines.
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    /// Build-local root for per-stage staging areas. Never part of the image.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    pub output_dir: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    pub git_bin: String,
    pub python_bin: String,
    pub go_bin: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            variant: Variant::WithHelper,
            source: SourceConfig {
                repo_url: "https://github.com/terminal-weather/terminal-weather".to_string(),
                git_ref: "master".to_string(),
                manifest_path: "requirements.txt".to_string(),
                entry_script: "bin/srv.py".to_string(),
                helper_subtree: "tooling/ansi-renderer".to_string(),
                helper_name: "ansi-renderer".to_string(),
            },
            install: InstallConfig {
                // mpld3 drags in a matplotlib build that the application
                // never imports at run time.
                exclude: vec!["mpld3".to_string()],
            },
            staging: StagingConfig {
                root: PathBuf::from(".weatherbox/staging"),
            },
            image: ImageConfig {
                output_dir: PathBuf::from("dist"),
                name: "weatherbox".to_string(),
            },
            tools: ToolsConfig {
                git_bin: "git".to_string(),
                python_bin: "python3".to_string(),
                go_bin: "go".to_string(),
            },
        }
    }
}

impl BuildConfig {
    /// Load the build configuration: defaults, then an optional TOML file,
    /// then `WEATHERBOX_BUILD_*` environment overrides (nested keys split on
    /// `__`, e.g. `WEATHERBOX_BUILD_SOURCE__GIT_REF`).
    pub fn load(config_file: Option<&Path>) -> Result<Self, BuildError> {
        let mut figment = Figment::from(Serialized::defaults(BuildConfig::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("WEATHERBOX_BUILD_").split("__"))
            .extract()
            .map_err(|e| BuildError::ConfigError {
                reason: e.to_string(),
            })
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            url: self.source.repo_url.clone(),
            git_ref: self.source.git_ref.clone(),
        }
    }
}

fn default_app_root() -> PathBuf {
    PathBuf::from("/app")
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8002
}

fn default_geo_db() -> PathBuf {
    PathBuf::from("/app/data/GeoLite2-City.mmdb")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/app/cache")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/weatherbox")
}

fn default_entry_script() -> String {
    "bin/srv.py".to_string()
}

/// Runtime configuration for the bootstrap supervisor. Constructed exactly
/// once at container start and passed explicitly to the supervisor; nothing
/// downstream reads ambient environment state.
///
/// Every optional key has a documented default; `helper_bin` stays unset in
/// the plain build variant. The geolocation database is mounted at run time,
/// not baked into the image, so its path may point at a file that does not
/// exist yet — the value is passed through to the child untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_geo_db")]
    pub geo_db: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_bin: Option<PathBuf>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_entry_script")]
    pub entry_script: String,
    /// Interpreter override. Defaults to the image's venv interpreter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
    /// Opaque API keys handed through to the child process environment
    /// (`WEATHERBOX_API_KEYS__<NAME>=<value>`).
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            app_root: default_app_root(),
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            geo_db: default_geo_db(),
            helper_bin: None,
            cache_dir: default_cache_dir(),
            log_dir: default_log_dir(),
            entry_script: default_entry_script(),
            interpreter: None,
            api_keys: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Runtime path of the generated supervisor configuration inside the
    /// assembled image.
    pub const IMAGE_CONFIG_PATH: &'static str = "/etc/weatherbox/supervisor.toml";

    /// Load runtime configuration: defaults, then the supervisor config file
    /// the assembler generated into the image (if present), then
    /// `WEATHERBOX_*` environment overrides.
    pub fn from_env() -> Result<Self, SupervisorError> {
        Self::load_from(Path::new(Self::IMAGE_CONFIG_PATH))
    }

    pub fn load_from(config_file: &Path) -> Result<Self, SupervisorError> {
        Figment::from(Serialized::defaults(RuntimeConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("WEATHERBOX_").split("__"))
            .extract()
            .map_err(|e| SupervisorError::ConfigError {
                reason: e.to_string(),
            })
    }

    /// Interpreter used to run the entry script: the explicit override, or
    /// the image's venv interpreter.
    pub fn interpreter_path(&self) -> PathBuf {
        self.interpreter
            .clone()
            .unwrap_or_else(|| self.app_root.join("venv/bin/python3"))
    }

    pub fn entry_script_path(&self) -> PathBuf {
        self.app_root.join(&self.entry_script)
    }
}
