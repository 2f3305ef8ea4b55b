//! Settings: built-in defaults, then an env file, then `CMAI_*` variables.
//!
//! The env file is read with `dotenvy`, so comments, quoting, `export`
//! prefixes and escapes follow the usual `.env` rules. Keys are
//! case-insensitive. Reading the file never touches the process environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::commit::diff::{DEFAULT_MAX_DIFF_CHARS, DiffOptions};
use crate::commit::prompt::{DEFAULT_PROMPT_TEMPLATE, unescape_template};
use crate::error::ConfigError;
use crate::llm::provider::{Provider, ProviderConfig};

/// Prefix for environment overrides, e.g. `CMAI_API_KEY`.
pub const ENV_PREFIX: &str = "CMAI_";

/// Environment variable for the stream idle timeout, in seconds.
pub const TIMEOUT_ENV_VAR: &str = "CMAI_TIMEOUT";

/// Default idle timeout between stream lines (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Keys that may be overridden from the environment. `TIMEOUT` is handled
/// separately and never fails.
const ENV_KEYS: &[&str] = &[
    "PROVIDER",
    "API_BASE",
    "API_KEY",
    "MODEL",
    "OLLAMA_HOST",
    "RESPONSE_LANGUAGE",
    "PROMPT_TEMPLATE",
    "MAX_DIFF_CHARS",
    "IGNORE_EXTENSIONS",
    "MAX_TOKEN",
    "ENABLE_THINKING",
    "LOG_LEVEL",
    "LOG_FILE_PATH",
];

/// Effective settings. Serializes without the API key, for logging.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub provider: String,
    /// Overrides the provider's default endpoint.
    pub api_base: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    pub ollama_host: Option<String>,
    pub response_language: String,
    pub prompt_template: String,
    pub max_diff_chars: usize,
    /// Replaces the built-in ignore list when set.
    pub ignore_extensions: Option<Vec<String>>,
    pub max_token: u32,
    pub enable_thinking: bool,
    pub log_level: String,
    /// `None` disables the log file.
    pub log_file_path: Option<PathBuf>,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
    /// Problems noticed while loading that did not stop it. Loading runs
    /// before logging is set up, so the caller reports these.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi.as_str().to_string(),
            api_base: None,
            api_key: String::new(),
            model: None,
            ollama_host: None,
            response_language: "English".to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_diff_chars: DEFAULT_MAX_DIFF_CHARS,
            ignore_extensions: None,
            max_token: 1024,
            enable_thinking: false,
            log_level: "info".to_string(),
            log_file_path: dirs::home_dir().map(|h| h.join(".logs").join("cmai").join("cmai.log")),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            warnings: Vec::new(),
        }
    }
}

/// `~/.config/cmai/settings.env`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config").join("cmai").join("settings.env"))
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit `config` file must exist. Without one, the default file is
    /// used and created empty when missing.
    pub fn load(config: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        let path = match config {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Some(path.to_path_buf())
            }
            None => default_settings_path().filter(|path| match ensure_settings_file(path) {
                Ok(()) => true,
                Err(e) => {
                    settings.warnings.push(format!(
                        "Could not create settings file {}: {}",
                        path.display(),
                        e
                    ));
                    false
                }
            }),
        };

        if let Some(path) = path {
            debug!("Loading settings from {}", path.display());
            settings.apply_env_file(&path)?;
        }

        settings.apply_process_env()?;
        Ok(settings)
    }

    /// Apply every `KEY=VALUE` pair of an env file.
    pub fn apply_env_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        for (key, value) in read_env_file(path)? {
            self.set(&key, &value)?;
        }
        Ok(())
    }

    fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        for key in ENV_KEYS {
            if let Ok(value) = env::var(format!("{}{}", ENV_PREFIX, key))
                && !value.is_empty()
            {
                self.set(key, &value)?;
            }
        }
        match timeout_from_env() {
            Ok(Some(timeout)) => self.timeout = timeout,
            Ok(None) => {}
            Err(warning) => self.warnings.push(warning),
        }
        Ok(())
    }

    /// Set one key. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = key.trim().to_ascii_uppercase();
        match key.as_str() {
            "PROVIDER" => self.provider = value.to_string(),
            "API_BASE" => self.api_base = non_empty(value),
            "API_KEY" => self.api_key = value.to_string(),
            "MODEL" => self.model = non_empty(value),
            "OLLAMA_HOST" => self.ollama_host = non_empty(value),
            "RESPONSE_LANGUAGE" => self.response_language = value.to_string(),
            "PROMPT_TEMPLATE" => self.prompt_template = unescape_template(value),
            "MAX_DIFF_CHARS" => {
                self.max_diff_chars = parse_number(&key, value, "a positive number of characters")?
            }
            "IGNORE_EXTENSIONS" => {
                self.ignore_extensions = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            "MAX_TOKEN" => self.max_token = parse_number(&key, value, "a positive token count")?,
            "ENABLE_THINKING" => self.enable_thinking = parse_bool(&key, value)?,
            "LOG_LEVEL" => self.log_level = value.to_string(),
            "LOG_FILE_PATH" => self.log_file_path = non_empty(value).map(|p| expand_home(&p)),
            "TIMEOUT" => {
                let secs: u64 = parse_number(&key, value, "a positive number of seconds")?;
                self.timeout = Duration::from_secs(secs);
            }
            _ => debug!("Ignoring unknown setting {}", key),
        }
        Ok(())
    }

    /// Provider addressing derived from these settings.
    pub fn provider_config(&self) -> ProviderConfig {
        let provider = Provider::resolve(&self.provider);
        let mut config = ProviderConfig::new(provider);

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        let base = if provider == Provider::Ollama {
            self.ollama_host.as_ref().or(self.api_base.as_ref())
        } else {
            self.api_base.as_ref()
        };
        if let Some(base) = base {
            config.base_url = base.clone();
        }
        config.api_key = self.api_key.clone();
        config.max_tokens = self.max_token;
        config.enable_thinking = self.enable_thinking;
        config
    }

    pub fn diff_options(&self) -> DiffOptions {
        let mut options = DiffOptions {
            max_chars: self.max_diff_chars,
            ..DiffOptions::default()
        };
        if let Some(suffixes) = &self.ignore_extensions {
            options.ignored_suffixes = suffixes.clone();
        }
        options
    }
}

/// Read an env file into upper-cased key/value pairs, in file order.
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let env_error = |source: dotenvy::Error| match source {
        dotenvy::Error::Io(source) => ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        },
        other => ConfigError::Malformed {
            path: path.to_path_buf(),
            source: other,
        },
    };

    dotenvy::from_path_iter(path)
        .map_err(env_error)?
        .map(|item| {
            item.map(|(key, value)| (key.to_ascii_uppercase(), value))
                .map_err(env_error)
        })
        .collect()
}

/// Idle timeout override from `CMAI_TIMEOUT`. An invalid value yields a
/// warning instead of an error.
fn timeout_from_env() -> Result<Option<Duration>, String> {
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
            _ => Err(format!("Invalid {} value '{}', ignoring it", TIMEOUT_ENV_VAR, v)),
        },
        _ => Ok(None),
    }
}

/// Create the default settings file (and its directory) when missing.
fn ensure_settings_file(path: &Path) -> std::io::Result<()> {
    if path.is_file() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::File::create(path)?;
    debug!("Created empty settings file at {}", path.display());
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}

fn parse_number<T>(key: &str, value: &str, expected: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "true or false",
        }),
    }
}
