//! Configuration management for witkit.
//!
//! Connection settings are loaded from several sources and merged, later sources
//! winning:
//! - TOML configuration file following the XDG Base Directory specification
//! - Environment variables (`WITKIT_*`)
//! - Command-line arguments
//!
//! ## Example
//!
//! ```rust,no_run
//! use witkit::Config;
//!
//! let config = Config::load_from_file()
//!     .unwrap()
//!     .merge(Config::load_from_env());
//! let settings = config.resolve().unwrap();
//! println!("Organization: {}", settings.organization);
//! ```

use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::{MAX_BATCH_SIZE, WorkItemClient};
use crate::error::ConfigError;
use crate::parsed_property::ParsedProperty;

/// Temporary struct for deserializing TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub pat: Option<String>,
    pub max_batch_size: Option<usize>,
    pub validate_only: Option<bool>,
}

/// Connection options shared by every CLI subcommand.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Azure DevOps organization name or URL
    #[arg(short, long, global = true, help_heading = "Azure DevOps Connection")]
    pub organization: Option<String>,

    /// Azure DevOps project name
    #[arg(short, long, global = true, help_heading = "Azure DevOps Connection")]
    pub project: Option<String>,

    /// Personal access token
    #[arg(long, global = true, help_heading = "Azure DevOps Connection")]
    pub pat: Option<String>,

    /// Maximum number of ids fetched per request (1-200)
    #[arg(long, global = true, help_heading = "Behavior")]
    pub max_batch_size: Option<usize>,

    /// Ask the server to validate writes without saving them
    #[arg(long, global = true, help_heading = "Behavior")]
    pub validate_only: bool,
}

/// Unresolved configuration, each value tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Azure DevOps organization name.
    pub organization: Option<ParsedProperty<String>>,
    /// Default project for adds and queries.
    pub project: Option<ParsedProperty<String>>,
    /// Personal access token.
    pub pat: Option<ParsedProperty<String>>,
    /// Maximum number of ids per batch request.
    pub max_batch_size: Option<ParsedProperty<usize>>,
    /// Whether writes are only validated by the server.
    pub validate_only: Option<ParsedProperty<bool>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            organization: None,
            project: None,
            pat: None,
            max_batch_size: Some(ParsedProperty::Default(MAX_BATCH_SIZE)),
            validate_only: Some(ParsedProperty::Default(false)),
        }
    }
}

/// Validated connection settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub organization: String,
    pub project: String,
    pub pat: SecretString,
    pub max_batch_size: usize,
    pub validate_only: bool,
}

impl Settings {
    /// Build a client for these settings.
    pub fn client(&self) -> Result<WorkItemClient, ConfigError> {
        let client = WorkItemClient::with_pat(
            self.organization.clone(),
            self.project.clone(),
            &self.pat,
        )
        .with_max_batch_size(self.max_batch_size)
        .map_err(|e| ConfigError::InvalidValue {
            field: "max_batch_size".to_string(),
            message: e.to_string(),
        })?;
        Ok(client.with_validate_only(self.validate_only))
    }
}

impl Config {
    /// Load configuration from the XDG config directory.
    ///
    /// A missing file yields the defaults.
    #[must_use = "this returns the loaded configuration which should be used"]
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(config_path)
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config_content =
            fs::read_to_string(&config_path).map_err(|e| ConfigError::FileReadError {
                path: config_path.clone(),
                message: e.to_string(),
            })?;

        let config_file: ConfigFile =
            toml::from_str(&config_content).map_err(|e| ConfigError::ParseError {
                path: config_path.clone(),
                message: e.to_string(),
            })?;

        let file = |value: String| ParsedProperty::File(value.clone(), config_path.clone(), value);
        Ok(Self {
            organization: config_file.organization.map(file),
            project: config_file.project.map(file),
            pat: config_file.pat.map(file),
            max_batch_size: config_file
                .max_batch_size
                .map(|v| ParsedProperty::File(v, config_path.clone(), v.to_string())),
            validate_only: config_file
                .validate_only
                .map(|v| ParsedProperty::File(v, config_path.clone(), v.to_string())),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Values that do not parse are ignored.
    pub fn load_from_env() -> Self {
        Self {
            organization: std::env::var("WITKIT_ORGANIZATION")
                .ok()
                .map(|v| ParsedProperty::Env(v.clone(), v)),
            project: std::env::var("WITKIT_PROJECT")
                .ok()
                .map(|v| ParsedProperty::Env(v.clone(), v)),
            pat: std::env::var("WITKIT_PAT")
                .ok()
                .map(|v| ParsedProperty::Env(v.clone(), v)),
            max_batch_size: std::env::var("WITKIT_MAX_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok().map(|v| ParsedProperty::Env(v, s))),
            validate_only: std::env::var("WITKIT_VALIDATE_ONLY")
                .ok()
                .and_then(|s| s.parse::<bool>().ok().map(|v| ParsedProperty::Env(v, s))),
        }
    }

    /// Build a Config from CLI connection arguments.
    pub fn from_args(args: &ConnectionArgs) -> Self {
        Self {
            organization: args
                .organization
                .as_ref()
                .map(|v| ParsedProperty::Cli(v.clone(), v.clone())),
            project: args
                .project
                .as_ref()
                .map(|v| ParsedProperty::Cli(v.clone(), v.clone())),
            pat: args
                .pat
                .as_ref()
                .map(|v| ParsedProperty::Cli(v.clone(), v.clone())),
            max_batch_size: args
                .max_batch_size
                .map(|v| ParsedProperty::Cli(v, v.to_string())),
            // A switch cannot say "false", so absence defers to the other sources.
            validate_only: args
                .validate_only
                .then(|| ParsedProperty::Cli(true, "--validate-only".to_string())),
        }
    }

    /// Get the XDG config file path for witkit, creating its directory.
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir()
                .map(|home| home.join(".config"))
                .ok_or_else(|| ConfigError::DirectoryCreationError {
                    path: PathBuf::from("~/.config"),
                    message: "could not determine home directory".to_string(),
                })?,
        };

        let witkit_config_dir = config_dir.join("witkit");
        if !witkit_config_dir.exists() {
            fs::create_dir_all(&witkit_config_dir).map_err(|e| {
                ConfigError::DirectoryCreationError {
                    path: witkit_config_dir.clone(),
                    message: e.to_string(),
                }
            })?;
        }

        Ok(witkit_config_dir.join("config.toml"))
    }

    /// Merge this config with another, preferring values from other when they exist
    pub fn merge(self, other: Self) -> Self {
        Self {
            organization: other.organization.or(self.organization),
            project: other.project.or(self.project),
            pat: other.pat.or(self.pat),
            max_batch_size: other.max_batch_size.or(self.max_batch_size),
            validate_only: other.validate_only.or(self.validate_only),
        }
    }

    /// Check required values and produce [`Settings`].
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let organization = required(self.organization, "organization", "WITKIT_ORGANIZATION")?;
        let project = required(self.project, "project", "WITKIT_PROJECT")?;
        let pat = required(self.pat, "pat", "WITKIT_PAT")?;

        let max_batch_size = match self.max_batch_size {
            Some(size) if !(1..=MAX_BATCH_SIZE).contains(&*size) => {
                return Err(ConfigError::InvalidValue {
                    field: "max_batch_size".to_string(),
                    message: format!(
                        "{size} (from {}) is outside 1..={MAX_BATCH_SIZE}",
                        size.describe_source()
                    ),
                });
            }
            Some(size) => size.into_value(),
            None => MAX_BATCH_SIZE,
        };

        Ok(Settings {
            organization: normalize_organization(&organization)?,
            project,
            pat: SecretString::from(pat),
            max_batch_size,
            validate_only: self.validate_only.is_some_and(|p| *p),
        })
    }

    /// Create a sample config file for user reference.
    ///
    /// Returns the path, and leaves an existing file untouched.
    #[must_use = "this operation can fail and the result should be checked"]
    pub fn create_sample_config() -> Result<PathBuf, ConfigError> {
        let config_path = Self::get_config_path()?;
        if config_path.exists() {
            return Ok(config_path);
        }

        let sample_config = r#"# witkit Configuration File
# Location: ~/.config/witkit/config.toml (Linux/macOS) or %APPDATA%\witkit\config.toml (Windows)

# Azure DevOps organization name or URL (required)
# organization = "your-organization"

# Default project for queries and new work items (required)
# project = "your-project"

# Personal Access Token (required, but consider using environment variable WITKIT_PAT instead)
# pat = "your-pat-token"

# Maximum number of work items fetched per request (optional, 1-200, defaults to 200)
max_batch_size = 200

# Validate writes on the server without saving them (optional, defaults to false)
validate_only = false
"#;

        fs::write(&config_path, sample_config).map_err(|e| ConfigError::FileReadError {
            path: config_path.clone(),
            message: e.to_string(),
        })?;
        Ok(config_path)
    }
}

fn required(
    property: Option<ParsedProperty<String>>,
    field: &str,
    env_var: &str,
) -> Result<String, ConfigError> {
    property
        .map(|p| p.value().trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            field: field.to_string(),
            env_var: env_var.to_string(),
        })
}

/// Reduce an organization name or URL to the bare organization name.
///
/// Accepts `https://dev.azure.com/{org}/...` and `https://{org}.visualstudio.com/...`.
pub fn normalize_organization(input: &str) -> Result<String, ConfigError> {
    let input = input.trim();
    if !input.contains("://") {
        return Ok(input.trim_matches('/').to_string());
    }

    let invalid = |message: &str| ConfigError::InvalidValue {
        field: "organization".to_string(),
        message: format!("{message}: {input}"),
    };
    let url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("URL has no host"))?;

    let name = if host.eq_ignore_ascii_case("dev.azure.com") {
        url.path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .map(str::to_string)
    } else {
        host.strip_suffix(".visualstudio.com").map(str::to_string)
    };
    name.filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("not an Azure DevOps organization URL"))
}
