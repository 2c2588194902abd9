//! Startup configuration.
//!
//! Every option is read from a `MEDAI_*` environment variable and has a
//! default, except the signing key: outside development a missing or short
//! `MEDAI_SIGNING_KEY` stops startup.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `MEDAI_ENV` | `development` |
//! | `MEDAI_STORE_URL` | `redis://127.0.0.1:6379/0` |
//! | `MEDAI_STORE_CONNECT_TIMEOUT` | `2s` |
//! | `MEDAI_STORE_OP_TIMEOUT` | `250ms` |
//! | `MEDAI_SIGNING_KEY` | random per process in development |
//! | `MEDAI_TOKEN_TTL` | `30m` |
//! | `MEDAI_RATE_LIMIT_WINDOW` | `60s` |
//! | `MEDAI_RATE_LIMIT_QUOTA` | `100` |
//! | `MEDAI_AUDIT_PATH` | unset, in-memory trail |
//! | `MEDAI_REVOCATION_FAIL_OPEN` | `true` |
//! | `MEDAI_RATE_LIMIT_FAIL_CLOSED` | `true` |

use std::{fmt, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use medai_guard_authn::{DEFAULT_TOKEN_TTL, RevocationFailurePolicy, SigningKey};
use medai_guard_storage::{FailurePolicy, RateLimitConfig, StoreConfig};

use crate::error::{GatewayError, Result};

/// Environment variable names.
pub mod vars {
    /// Deployment mode.
    pub const ENV: &str = "MEDAI_ENV";
    /// Store connection URL.
    pub const STORE_URL: &str = "MEDAI_STORE_URL";
    /// Store connect timeout.
    pub const STORE_CONNECT_TIMEOUT: &str = "MEDAI_STORE_CONNECT_TIMEOUT";
    /// Per-operation store timeout.
    pub const STORE_OP_TIMEOUT: &str = "MEDAI_STORE_OP_TIMEOUT";
    /// HMAC signing secret.
    pub const SIGNING_KEY: &str = "MEDAI_SIGNING_KEY";
    /// Default token lifetime.
    pub const TOKEN_TTL: &str = "MEDAI_TOKEN_TTL";
    /// Rate limit window length.
    pub const RATE_LIMIT_WINDOW: &str = "MEDAI_RATE_LIMIT_WINDOW";
    /// Requests allowed per window.
    pub const RATE_LIMIT_QUOTA: &str = "MEDAI_RATE_LIMIT_QUOTA";
    /// JSONL audit file.
    pub const AUDIT_PATH: &str = "MEDAI_AUDIT_PATH";
    /// Allow requests when the revocation check cannot reach the store.
    pub const REVOCATION_FAIL_OPEN: &str = "MEDAI_REVOCATION_FAIL_OPEN";
    /// Reject requests when the rate limit counter cannot reach the store.
    pub const RATE_LIMIT_FAIL_CLOSED: &str = "MEDAI_RATE_LIMIT_FAIL_CLOSED";
}

/// Default rate limit window.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Default requests per window.
pub const DEFAULT_RATE_LIMIT_QUOTA: u64 = 100;

/// Deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Local development; a missing signing key is replaced by a random one.
    #[default]
    Development,
    /// Anything deployed; every secret must be supplied.
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

impl FromStr for Environment {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(GatewayError::config(format!(
                "{}: unknown environment '{other}' (expected development or production)",
                vars::ENV
            ))),
        }
    }
}

/// Fully resolved gateway configuration.
#[derive(Debug, Clone, bon::Builder)]
pub struct GuardConfig {
    /// Deployment mode.
    #[builder(default)]
    pub environment: Environment,
    /// Store connection settings.
    #[builder(default)]
    pub store: StoreConfig,
    /// Token signing secret.
    pub signing_key: Arc<SigningKey>,
    /// Lifetime of tokens issued without an explicit TTL.
    #[builder(default = DEFAULT_TOKEN_TTL)]
    pub token_ttl: Duration,
    /// Per-identity quota.
    pub rate_limit: RateLimitConfig,
    /// JSONL audit file; `None` keeps the trail in memory.
    #[builder(into)]
    pub audit_path: Option<PathBuf>,
    /// Behaviour of revocation checks when the store fails.
    #[builder(default)]
    pub revocation_policy: RevocationFailurePolicy,
    /// Behaviour of rate limiting when the store fails.
    #[builder(default)]
    pub rate_limit_policy: FailurePolicy,
}

impl GuardConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigurationError`] naming the first variable
    /// that is unparsable, or a missing signing key outside development.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// See [`GuardConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let environment = get(vars::ENV).map(|v| v.parse::<Environment>()).transpose()?.unwrap_or_default();

        let store = store_config(
            get(vars::STORE_URL),
            parse_duration(vars::STORE_CONNECT_TIMEOUT, get(vars::STORE_CONNECT_TIMEOUT))?,
            parse_duration(vars::STORE_OP_TIMEOUT, get(vars::STORE_OP_TIMEOUT))?,
        )?;

        let signing_key = match get(vars::SIGNING_KEY) {
            Some(secret) => SigningKey::new(secret.into_bytes())
                .map_err(|e| GatewayError::config(format!("{}: {e}", vars::SIGNING_KEY)))?,
            None if environment == Environment::Development => {
                tracing::warn!(
                    variable = vars::SIGNING_KEY,
                    "no signing key configured; using a random per-process key, tokens will not survive a restart"
                );
                SigningKey::generate()
            },
            None => {
                return Err(GatewayError::config(format!(
                    "{} is required in {environment}",
                    vars::SIGNING_KEY
                )));
            },
        };

        let token_ttl =
            parse_duration(vars::TOKEN_TTL, get(vars::TOKEN_TTL))?.unwrap_or(DEFAULT_TOKEN_TTL);
        if token_ttl < Duration::from_secs(1) {
            return Err(GatewayError::config(format!("{}: must be at least 1s", vars::TOKEN_TTL)));
        }

        let window = parse_duration(vars::RATE_LIMIT_WINDOW, get(vars::RATE_LIMIT_WINDOW))?
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW);
        let quota = get(vars::RATE_LIMIT_QUOTA)
            .map(|v| {
                v.trim().parse::<u64>().map_err(|e| {
                    GatewayError::config(format!("{}: invalid integer '{v}': {e}", vars::RATE_LIMIT_QUOTA))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_RATE_LIMIT_QUOTA);
        let rate_limit = RateLimitConfig::new(quota, window).map_err(|e| {
            GatewayError::config(format!("{}/{}: {e}", vars::RATE_LIMIT_QUOTA, vars::RATE_LIMIT_WINDOW))
        })?;

        let revocation_policy =
            if parse_bool(vars::REVOCATION_FAIL_OPEN, get(vars::REVOCATION_FAIL_OPEN))?.unwrap_or(true) {
                RevocationFailurePolicy::FailOpen
            } else {
                RevocationFailurePolicy::FailClosed
            };
        let rate_limit_policy =
            if parse_bool(vars::RATE_LIMIT_FAIL_CLOSED, get(vars::RATE_LIMIT_FAIL_CLOSED))?.unwrap_or(true)
            {
                FailurePolicy::FailClosed
            } else {
                FailurePolicy::FailOpen
            };

        Ok(Self {
            environment,
            store,
            signing_key: Arc::new(signing_key),
            token_ttl,
            rate_limit,
            audit_path: get(vars::AUDIT_PATH).map(PathBuf::from),
            revocation_policy,
            rate_limit_policy,
        })
    }
}

fn store_config(
    url: Option<String>,
    connect_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
) -> Result<StoreConfig> {
    StoreConfig::builder()
        .maybe_url(url)
        .maybe_connect_timeout(connect_timeout)
        .maybe_operation_timeout(operation_timeout)
        .build()
        .map_err(|e| GatewayError::config(format!("store: {e}")))
}

fn parse_duration(name: &str, value: Option<String>) -> Result<Option<Duration>> {
    value
        .map(|v| {
            humantime::parse_duration(v.trim())
                .map_err(|e| GatewayError::config(format!("{name}: invalid duration '{v}': {e}")))
        })
        .transpose()
}

fn parse_bool(name: &str, value: Option<String>) -> Result<Option<bool>> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(GatewayError::config(format!("{name}: invalid boolean '{v}'"))),
        })
        .transpose()
}
