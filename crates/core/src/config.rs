use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogEntry, CatalogError};
use crate::relay::RetryPolicy;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub registry: RegistryConfig,
    pub relay: RelayConfig,
    pub catalog: Catalog,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub users_file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub users_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub api_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: DEFAULT_TELEGRAM_API_URL.to_string(),
                poll_timeout_secs: 30,
            },
            registry: RegistryConfig { users_file: PathBuf::from("users.cfg") },
            relay: RelayConfig {
                max_attempts: retry.max_attempts,
                base_delay_ms: retry.base_delay_ms,
                max_delay_ms: retry.max_delay_ms,
            },
            catalog: Catalog::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl RelayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("procurebot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(users_file) = registry.users_file {
                self.registry.users_file = users_file;
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(max_attempts) = relay.max_attempts {
                self.relay.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = relay.base_delay_ms {
                self.relay.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = relay.max_delay_ms {
                self.relay.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(departments) = catalog.departments {
                self.catalog.departments = departments;
            }
            if let Some(priorities) = catalog.priorities {
                self.catalog.priorities = priorities;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let bot_token =
            read_env("PROCUREBOT_TELEGRAM_BOT_TOKEN").or_else(|| read_env("TELEGRAM_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("PROCUREBOT_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("PROCUREBOT_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("PROCUREBOT_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROCUREBOT_REGISTRY_USERS_FILE") {
            self.registry.users_file = PathBuf::from(value);
        }

        if let Some(value) = read_env("PROCUREBOT_RELAY_MAX_ATTEMPTS") {
            self.relay.max_attempts = parse_u32("PROCUREBOT_RELAY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PROCUREBOT_RELAY_BASE_DELAY_MS") {
            self.relay.base_delay_ms = parse_u64("PROCUREBOT_RELAY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PROCUREBOT_RELAY_MAX_DELAY_MS") {
            self.relay.max_delay_ms = parse_u64("PROCUREBOT_RELAY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("PROCUREBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROCUREBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("PROCUREBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PROCUREBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PROCUREBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PROCUREBOT_LOGGING_LEVEL").or_else(|| read_env("PROCUREBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROCUREBOT_LOGGING_FORMAT").or_else(|| read_env("PROCUREBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(users_file) = overrides.users_file {
            self.registry.users_file = users_file;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(api_base_url) = overrides.api_base_url {
            self.telegram.api_base_url = api_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telegram(&self.telegram)?;
        validate_registry(&self.registry)?;
        validate_relay(&self.relay)?;
        self.catalog.validate()?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("procurebot.toml"), PathBuf::from("config/procurebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let token = telegram.bot_token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Set TELEGRAM_BOT_TOKEN or get a token from @BotFather"
                .to_string(),
        ));
    }
    let well_formed = token.split_once(':').is_some_and(|(bot_id, secret)| {
        !bot_id.is_empty() && bot_id.chars().all(|ch| ch.is_ascii_digit()) && !secret.is_empty()
    });
    if !well_formed {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    let url = telegram.api_base_url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 0..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.users_file.as_os_str().is_empty() {
        return Err(ConfigError::Validation("registry.users_file must not be empty".to_string()));
    }
    Ok(())
}

fn validate_relay(relay: &RelayConfig) -> Result<(), ConfigError> {
    if relay.max_attempts == 0 || relay.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "relay.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if relay.base_delay_ms > relay.max_delay_ms {
        return Err(ConfigError::Validation(
            "relay.base_delay_ms must not exceed relay.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    registry: Option<RegistryPatch>,
    relay: Option<RelayPatch>,
    catalog: Option<CatalogPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    users_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    departments: Option<Vec<CatalogEntry>>,
    priorities: Option<Vec<CatalogEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::catalog::CatalogError;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOKEN_VARS: [&str; 2] = ["PROCUREBOT_TELEGRAM_BOT_TOKEN", "TELEGRAM_BOT_TOKEN"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn write_config(dir: &TempDir, body: &str) -> Result<PathBuf, String> {
        let path = dir.path().join("procurebot.toml");
        fs::write(&path, body).map_err(|err| err.to_string())?;
        Ok(path)
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("TEST_PROCUREBOT_TOKEN", "12345:from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[telegram]
bot_token = "${TEST_PROCUREBOT_TOKEN}"

[registry]
users_file = "/etc/procurebot/users.cfg"
"#,
            )?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "12345:from-env",
                "bot token should be loaded from environment",
            )?;
            ensure(
                config.registry.users_file == PathBuf::from("/etc/procurebot/users.cfg"),
                "users file should come from the config file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_PROCUREBOT_TOKEN"]);
        result
    }

    #[test]
    fn conventional_token_variable_is_honoured() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("TELEGRAM_BOT_TOKEN", "777:plain-env");
        env::set_var("PROCUREBOT_LOG_LEVEL", "warn");
        env::set_var("PROCUREBOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "777:plain-env",
                "TELEGRAM_BOT_TOKEN should provide the bot token",
            )?;
            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TELEGRAM_BOT_TOKEN", "PROCUREBOT_LOG_LEVEL", "PROCUREBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("PROCUREBOT_TELEGRAM_BOT_TOKEN", "1:from-env");
        env::set_var("TELEGRAM_BOT_TOKEN", "2:loses-to-prefixed");
        env::set_var("PROCUREBOT_RELAY_MAX_ATTEMPTS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[telegram]
bot_token = "3:from-file"

[relay]
max_attempts = 2
base_delay_ms = 250

[logging]
level = "warn"
"#,
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    users_file: Some(PathBuf::from("override-users.cfg")),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.registry.users_file == PathBuf::from("override-users.cfg"),
                "override users file should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.telegram.bot_token.expose_secret() == "1:from-env",
                "prefixed env token should win over file and the plain variable",
            )?;
            ensure(config.relay.max_attempts == 5, "env retry budget should win over file")?;
            ensure(config.relay.base_delay_ms == 250, "file base delay should win over default")?;
            ensure(
                config.relay.retry_policy().max_attempts == 5,
                "retry policy mirrors relay config",
            )?;
            Ok(())
        })();

        clear_vars(&["PROCUREBOT_TELEGRAM_BOT_TOKEN", "TELEGRAM_BOT_TOKEN"]);
        clear_vars(&["PROCUREBOT_RELAY_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn catalog_section_replaces_defaults_and_is_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = write_config(
            &dir,
            r#"
[telegram]
bot_token = "9:file"

[catalog]
departments = [
    { id = "lab", label = "Laboratory" },
    { id = "kitchen", label = "Kitchen" },
]
"#,
        )?;
        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.catalog.departments.len() == 2, "departments should come from file")?;
        ensure(config.catalog.department("lab").is_some(), "lab should be a department")?;
        ensure(config.catalog.priority("urgent").is_some(), "priorities keep their defaults")?;

        let path = write_config(
            &dir,
            r#"
[telegram]
bot_token = "9:file"

[catalog]
priorities = [
    { id = "low", label = "Low" },
    { id = "low", label = "Also low" },
]
"#,
        )?;
        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..Default::default() }) {
                Ok(_) => return Err("duplicate priority ids must be rejected".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::Catalog(CatalogError::DuplicateId { .. })),
            "duplicate ids should surface as a catalog error",
        )
    }

    #[test]
    fn missing_token_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
        );
        ensure(has_message, "validation failure should mention telegram.bot_token")
    }

    #[test]
    fn malformed_numeric_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("TELEGRAM_BOT_TOKEN", "1:token");
        env::set_var("PROCUREBOT_SERVER_HEALTH_CHECK_PORT", "eighty");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("non-numeric port must be rejected".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "PROCUREBOT_SERVER_HEALTH_CHECK_PORT",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["TELEGRAM_BOT_TOKEN", "PROCUREBOT_SERVER_HEALTH_CHECK_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&TOKEN_VARS);

        env::set_var("TELEGRAM_BOT_TOKEN", "4242:secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("secret-value"), "debug output should not contain bot token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(
                config.registry.users_file == PathBuf::from("users.cfg"),
                "default users file should be users.cfg",
            )?;
            Ok(())
        })();

        clear_vars(&["TELEGRAM_BOT_TOKEN"]);
        result
    }
}
