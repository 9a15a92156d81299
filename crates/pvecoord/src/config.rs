//! Provider configuration.
//!
//! Settings come from `PM_*` environment variables (or any serde source).
//! Secrets are wrapped in `Secret` so they never show up in `Debug` output
//! and are skipped when the configuration is serialized.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordination::Parallelism;
use crate::logging::LogConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pm_parallel must be at least 1, got {0}")]
    InvalidParallelism(i64),
    #[error("pm_parallel must be at most {max}, got {got}")]
    ParallelismTooLarge { got: i64, max: usize },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("password and API token secret both exist, choose one or the other")]
    ConflictingCredentials,
    #[error("password and API token do not exist, one of these must exist")]
    MissingCredentials,
    #[error("user {0:?} looks like an API token id but is used with a password")]
    TokenUserWithPassword(String),
    #[error("API token id {0:?} should contain a '!', check your API credentials")]
    MalformedTokenId(String),
    #[error("password login requires a session ticket, which is not supported; use an API token")]
    PasswordSessionUnsupported,
    #[error("invalid logging level {level:?} for {logger}")]
    InvalidLogLevel { logger: String, level: String },
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// A credential value that is redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Validated credential choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    ApiToken {
        id: &'a str,
        secret: &'a str,
    },
    Password {
        user: &'a str,
        password: &'a str,
        otp: Option<&'a str>,
    },
}

fn default_parallel() -> i64 {
    Parallelism::DEFAULT as i64
}

fn default_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// e.g. `https://host.fqdn:8006/api2/json`
    pub api_url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub api_token_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_token_secret: Option<Secret>,
    #[serde(default, skip_serializing)]
    pub otp: Option<Secret>,
    /// Raw value; validated by `parallelism()`.
    #[serde(default = "default_parallel")]
    pub parallel: i64,
    #[serde(default)]
    pub tls_insecure: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub dangerously_ignore_unknown_attributes: bool,
}

impl ProviderConfig {
    /// Minimal configuration for `api_url`, everything else at its default.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            user: None,
            password: None,
            api_token_id: None,
            api_token_secret: None,
            otp: None,
            parallel: default_parallel(),
            tls_insecure: false,
            timeout: default_timeout(),
            log: LogConfig::default(),
            dangerously_ignore_unknown_attributes: false,
        }
    }

    pub fn with_api_token(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.api_token_id = Some(id.into());
        self.api_token_secret = Some(Secret::new(secret));
        self
    }

    pub fn with_password(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(Secret::new(password));
        self
    }

    pub fn with_parallel(mut self, parallel: i64) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_url = get("PM_API_URL").ok_or(ConfigError::Missing("PM_API_URL"))?;

        let otp = get("PM_OTP").map(Secret);
        if get("PM_OTP_PROMPT").as_deref() == Some("1") && otp.is_none() {
            return Err(ConfigError::Missing("PM_OTP"));
        }

        let timeout = parse_number(&get, "PM_TIMEOUT")?.unwrap_or_else(default_timeout);
        if timeout == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PM_TIMEOUT",
                value: timeout.to_string(),
            });
        }

        let mut log = LogConfig::default();
        if let Some(value) = get("PM_LOG_ENABLE") {
            log.enable = parse_flag("PM_LOG_ENABLE", &value)?;
        }
        if let Some(file) = get("PM_LOG_FILE") {
            log.file = PathBuf::from(file);
        }
        if let Some(value) = get("PM_LOG_LEVELS") {
            log.levels = parse_levels(&value)?;
        }

        Ok(Self {
            api_url,
            user: get("PM_USER"),
            password: get("PM_PASS").map(Secret),
            api_token_id: get("PM_API_TOKEN_ID"),
            api_token_secret: get("PM_API_TOKEN_SECRET").map(Secret),
            otp,
            parallel: parse_number(&get, "PM_PARALLEL")?.unwrap_or_else(default_parallel),
            tls_insecure: parse_optional_flag(&get, "PM_TLS_INSECURE")?,
            timeout,
            log,
            dangerously_ignore_unknown_attributes: parse_optional_flag(
                &get,
                "PM_DANGEROUSLY_IGNORE_UNKNOWN_ATTRIBUTES",
            )?,
        })
    }

    pub fn parallelism(&self) -> Result<Parallelism, ConfigError> {
        Parallelism::try_from(self.parallel)
    }

    /// Per-request timeout; zero would fail every request, so it is rejected.
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        match self.timeout {
            0 => Err(ConfigError::InvalidValue {
                name: "PM_TIMEOUT",
                value: self.timeout.to_string(),
            }),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    /// Pick the credential mode, rejecting ambiguous or malformed combinations.
    pub fn credentials(&self) -> Result<Credentials<'_>, ConfigError> {
        let password = self.password.as_ref().map(Secret::expose);
        let token_secret = self.api_token_secret.as_ref().map(Secret::expose);

        match (password, token_secret) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingCredentials),
            (None, None) => Err(ConfigError::MissingCredentials),
            (Some(password), None) => {
                let user = self.user.as_deref().ok_or(ConfigError::Missing("PM_USER"))?;
                if user.contains('!') {
                    return Err(ConfigError::TokenUserWithPassword(user.to_string()));
                }
                Ok(Credentials::Password {
                    user,
                    password,
                    otp: self.otp.as_ref().map(Secret::expose),
                })
            }
            (None, Some(secret)) => {
                let id = self
                    .api_token_id
                    .as_deref()
                    .ok_or(ConfigError::Missing("PM_API_TOKEN_ID"))?;
                if !id.contains('!') {
                    return Err(ConfigError::MalformedTokenId(id.to_string()));
                }
                Ok(Credentials::ApiToken { id, secret })
            }
        }
    }
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            name,
            value: other.to_string(),
        }),
    }
}

fn parse_optional_flag<G>(get: &G, name: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(name).map_or(Ok(false), |value| parse_flag(name, &value))
}

fn parse_number<G, T>(get: &G, name: &'static str) -> Result<Option<T>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    get(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                name,
                value: value.clone(),
            })
        })
        .transpose()
}

/// Parse `logger=level,logger=level`.
fn parse_levels(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((logger, level)) if !logger.trim().is_empty() => {
                Ok((logger.trim().to_string(), level.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                name: "PM_LOG_LEVELS",
                value: pair.to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    const URL: &str = "https://pve.example:8006/api2/json";

    #[test]
    fn defaults_match_provider_schema() {
        let config = ProviderConfig::from_lookup(lookup(&[("PM_API_URL", URL)])).unwrap();

        assert_eq!(config.parallel, 4);
        assert_eq!(config.timeout, 300);
        assert!(!config.tls_insecure);
        assert!(!config.log.enable);
        assert_eq!(config.log.file, PathBuf::from("pvecoord.log"));
        assert!(!config.dangerously_ignore_unknown_attributes);
        assert_eq!(config, ProviderConfig::new(URL));
    }

    #[test]
    fn api_url_is_required() {
        let err = ProviderConfig::from_lookup(lookup(&[("PM_USER", "root@pam")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PM_API_URL")));
    }

    #[test]
    fn reads_all_variables() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("PM_API_URL", URL),
            ("PM_API_TOKEN_ID", "terraform@pve!ci"),
            ("PM_API_TOKEN_SECRET", "0f8e-secret"),
            ("PM_PARALLEL", "2"),
            ("PM_TIMEOUT", "60"),
            ("PM_TLS_INSECURE", "true"),
            ("PM_LOG_ENABLE", "1"),
            ("PM_LOG_FILE", "/tmp/pve.log"),
            ("PM_LOG_LEVELS", "_default=debug, pvecoord::gate=trace"),
            ("PM_DANGEROUSLY_IGNORE_UNKNOWN_ATTRIBUTES", "T"),
        ]))
        .unwrap();

        assert_eq!(config.parallel, 2);
        assert_eq!(config.timeout, 60);
        assert!(config.tls_insecure);
        assert!(config.log.enable);
        assert_eq!(config.log.file, PathBuf::from("/tmp/pve.log"));
        assert_eq!(config.log.levels["_default"], "debug");
        assert_eq!(config.log.levels["pvecoord::gate"], "trace");
        assert!(config.dangerously_ignore_unknown_attributes);
        assert_eq!(
            config.credentials().unwrap(),
            Credentials::ApiToken {
                id: "terraform@pve!ci",
                secret: "0f8e-secret",
            }
        );
    }

    #[test]
    fn rejects_malformed_numbers_and_flags() {
        let err = ProviderConfig::from_lookup(lookup(&[("PM_API_URL", URL), ("PM_PARALLEL", "four")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PM_PARALLEL", .. }));

        let err = ProviderConfig::from_lookup(lookup(&[
            ("PM_API_URL", URL),
            ("PM_TLS_INSECURE", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PM_TLS_INSECURE", .. }));

        let err = ProviderConfig::from_lookup(lookup(&[
            ("PM_API_URL", URL),
            ("PM_LOG_LEVELS", "debug"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PM_LOG_LEVELS", .. }));
    }

    #[test]
    fn otp_required_when_prompting() {
        let err = ProviderConfig::from_lookup(lookup(&[
            ("PM_API_URL", URL),
            ("PM_OTP_PROMPT", "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PM_OTP")));

        let config = ProviderConfig::from_lookup(lookup(&[
            ("PM_API_URL", URL),
            ("PM_OTP_PROMPT", "1"),
            ("PM_OTP", "123456"),
        ]))
        .unwrap();
        assert_eq!(config.otp.unwrap().expose(), "123456");
    }

    #[test]
    fn non_positive_parallelism_is_rejected() {
        for bad in [0, -1] {
            let config = ProviderConfig::new(URL).with_parallel(bad);
            assert!(matches!(
                config.parallelism(),
                Err(ConfigError::InvalidParallelism(n)) if n == bad
            ));
        }
        assert_eq!(ProviderConfig::new(URL).parallelism().unwrap().get(), 4);
    }

    #[test]
    fn parallelism_above_semaphore_limit_has_its_own_error() {
        let config = ProviderConfig::new(URL).with_parallel(i64::MAX);
        let err = config.parallelism().unwrap_err();

        assert!(matches!(err, ConfigError::ParallelismTooLarge { got: i64::MAX, .. }));
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ProviderConfig::from_lookup(lookup(&[("PM_API_URL", URL), ("PM_TIMEOUT", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PM_TIMEOUT", .. }));

        let mut config = ProviderConfig::new(URL);
        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(300));
        config.timeout = 0;
        assert!(matches!(
            config.request_timeout(),
            Err(ConfigError::InvalidValue { name: "PM_TIMEOUT", .. })
        ));
    }

    #[test]
    fn password_and_token_conflict() {
        let config = ProviderConfig::new(URL)
            .with_password("root@pam", "hunter2")
            .with_api_token("root@pam!ci", "secret");
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::ConflictingCredentials)
        ));
    }

    #[test]
    fn some_credential_is_required() {
        assert!(matches!(
            ProviderConfig::new(URL).credentials(),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn token_style_user_with_password_is_rejected() {
        let config = ProviderConfig::new(URL).with_password("root@pam!ci", "hunter2");
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::TokenUserWithPassword(_))
        ));
    }

    #[test]
    fn token_id_needs_bang() {
        let config = ProviderConfig::new(URL).with_api_token("root@pam", "secret");
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::MalformedTokenId(_))
        ));
    }

    #[test]
    fn password_credentials_carry_otp() {
        let mut config = ProviderConfig::new(URL).with_password("root@pam", "hunter2");
        config.otp = Some(Secret::new("654321"));

        assert_eq!(
            config.credentials().unwrap(),
            Credentials::Password {
                user: "root@pam",
                password: "hunter2",
                otp: Some("654321"),
            }
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ProviderConfig::new(URL).with_api_token("root@pam!ci", "top-secret-uuid");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret-uuid"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn serializes_without_secrets() {
        let config = ProviderConfig::new(URL)
            .with_api_token("root@pam!ci", "top-secret-uuid")
            .with_parallel(2);

        insta::assert_json_snapshot!(config, @r#"
        {
          "api_url": "https://pve.example:8006/api2/json",
          "user": null,
          "api_token_id": "root@pam!ci",
          "parallel": 2,
          "tls_insecure": false,
          "timeout": 300,
          "log": {
            "enable": false,
            "file": "pvecoord.log",
            "levels": {}
          },
          "dangerously_ignore_unknown_attributes": false
        }
        "#);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "api_url": URL,
            "api_token_id": "root@pam!ci",
            "api_token_secret": "uuid",
        }))
        .unwrap();

        assert_eq!(config.parallel, 4);
        assert_eq!(config.timeout, 300);
        assert!(config.credentials().is_ok());
    }
}
