use anyhow::{Context, Result};
use serde::Serialize;
use std::str::FromStr;
use tracing::info;

const MAX_SIGNUP_TOKEN_TTL_DAYS: i64 = 365;
const MAX_LOGIN_LINK_TTL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub stripe: StripeConfig,

    pub email: EmailConfig,

    pub auth: AuthConfig,

    pub access: AccessConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// Deployment environment name. `production` disables debug affordances.
    pub environment: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/quizgate.db".to_string(),
            log_level: "info".to_string(),
            environment: "development".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub port: u16,

    /// Public origin used to build claim and login links.
    pub base_url: String,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    pub session_idle_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            secure_cookies: true,
            session_idle_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StripeConfig {
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,

    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,

    pub price_id: Option<String>,

    pub api_base: String,

    /// Maximum age of a signed webhook timestamp.
    pub webhook_tolerance_seconds: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            price_id: None,
            api_base: "https://api.stripe.com".to_string(),
            webhook_tolerance_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailConfig {
    /// When unset, outgoing links are written to the log instead of sent.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub api_url: String,

    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.resend.com/emails".to_string(),
            from_address: "Quizgate <no-reply@localhost>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthConfig {
    pub min_password_length: usize,

    pub signup_token_ttl_days: i64,

    pub login_link_ttl_minutes: i64,

    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_length: 6,
            signup_token_ttl_days: 7,
            login_link_ttl_minutes: 15,
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessConfig {
    pub login_path: String,

    pub subscribe_path: String,

    pub recheck_interval_seconds: u64,

    /// End the session server-side before redirecting an unentitled user.
    pub sign_out_on_deny: bool,

    pub debug_bypass_enabled: bool,

    #[serde(skip_serializing)]
    pub debug_bypass_secret: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            subscribe_path: "/subscribe".to_string(),
            recheck_interval_seconds: 60,
            sign_out_on_deny: true,
            debug_bypass_enabled: false,
            debug_bypass_secret: None,
        }
    }
}

impl AccessConfig {
    /// The bypass secret, only when the bypass is switched on.
    #[must_use]
    pub fn active_bypass_secret(&self) -> Option<&str> {
        if self.debug_bypass_enabled {
            self.debug_bypass_secret.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment, reading `.env` first when present.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from: {}", path.display());
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let base_url = env
            .string("BASE_URL")
            .unwrap_or(defaults.server.base_url)
            .trim_end_matches('/')
            .to_string();

        let cors_allowed_origins = env.string("QUIZGATE_CORS_ORIGINS").map_or_else(
            || vec![base_url.clone()],
            |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            },
        );

        Ok(Self {
            general: GeneralConfig {
                database_url: env
                    .string("DATABASE_URL")
                    .unwrap_or(defaults.general.database_url),
                log_level: env
                    .string("QUIZGATE_LOG_LEVEL")
                    .unwrap_or(defaults.general.log_level),
                environment: env
                    .string("QUIZGATE_ENV")
                    .unwrap_or(defaults.general.environment),
                worker_threads: env
                    .parse("QUIZGATE_WORKER_THREADS")?
                    .unwrap_or(defaults.general.worker_threads),
                max_db_connections: env
                    .parse("QUIZGATE_MAX_DB_CONNECTIONS")?
                    .unwrap_or(defaults.general.max_db_connections),
                min_db_connections: env
                    .parse("QUIZGATE_MIN_DB_CONNECTIONS")?
                    .unwrap_or(defaults.general.min_db_connections),
            },
            server: ServerConfig {
                port: env.parse("PORT")?.unwrap_or(defaults.server.port),
                base_url,
                cors_allowed_origins,
                secure_cookies: env
                    .flag("QUIZGATE_SECURE_COOKIES")?
                    .unwrap_or(defaults.server.secure_cookies),
                session_idle_minutes: env
                    .parse("QUIZGATE_SESSION_IDLE_MINUTES")?
                    .unwrap_or(defaults.server.session_idle_minutes),
            },
            stripe: StripeConfig {
                secret_key: env.string("STRIPE_SECRET_KEY"),
                webhook_secret: env.string("STRIPE_WEBHOOK_SECRET"),
                price_id: env.string("STRIPE_PRICE_ID"),
                api_base: env
                    .string("STRIPE_API_BASE")
                    .unwrap_or(defaults.stripe.api_base),
                webhook_tolerance_seconds: env
                    .parse("STRIPE_WEBHOOK_TOLERANCE_SECONDS")?
                    .unwrap_or(defaults.stripe.webhook_tolerance_seconds),
            },
            email: EmailConfig {
                api_key: env.string("EMAIL_API_KEY"),
                api_url: env
                    .string("EMAIL_API_URL")
                    .unwrap_or(defaults.email.api_url),
                from_address: env
                    .string("EMAIL_FROM")
                    .unwrap_or(defaults.email.from_address),
            },
            auth: AuthConfig {
                min_password_length: env
                    .parse("QUIZGATE_MIN_PASSWORD_LENGTH")?
                    .unwrap_or(defaults.auth.min_password_length),
                signup_token_ttl_days: env
                    .parse("QUIZGATE_SIGNUP_TOKEN_TTL_DAYS")?
                    .unwrap_or(defaults.auth.signup_token_ttl_days),
                login_link_ttl_minutes: env
                    .parse("QUIZGATE_LOGIN_LINK_TTL_MINUTES")?
                    .unwrap_or(defaults.auth.login_link_ttl_minutes),
                argon2_memory_cost_kib: env
                    .parse("QUIZGATE_ARGON2_MEMORY_KIB")?
                    .unwrap_or(defaults.auth.argon2_memory_cost_kib),
                argon2_time_cost: env
                    .parse("QUIZGATE_ARGON2_TIME_COST")?
                    .unwrap_or(defaults.auth.argon2_time_cost),
                argon2_parallelism: env
                    .parse("QUIZGATE_ARGON2_PARALLELISM")?
                    .unwrap_or(defaults.auth.argon2_parallelism),
            },
            access: AccessConfig {
                login_path: env
                    .string("QUIZGATE_LOGIN_PATH")
                    .unwrap_or(defaults.access.login_path),
                subscribe_path: env
                    .string("QUIZGATE_SUBSCRIBE_PATH")
                    .unwrap_or(defaults.access.subscribe_path),
                recheck_interval_seconds: env
                    .parse("QUIZGATE_RECHECK_INTERVAL_SECONDS")?
                    .unwrap_or(defaults.access.recheck_interval_seconds),
                sign_out_on_deny: env
                    .flag("QUIZGATE_SIGN_OUT_ON_DENY")?
                    .unwrap_or(defaults.access.sign_out_on_deny),
                debug_bypass_enabled: env
                    .flag("QUIZGATE_DEBUG_BYPASS_ENABLED")?
                    .unwrap_or(defaults.access.debug_bypass_enabled),
                debug_bypass_secret: env.string("QUIZGATE_DEBUG_BYPASS_SECRET"),
            },
            observability: ObservabilityConfig {
                metrics_enabled: env
                    .flag("QUIZGATE_METRICS_ENABLED")?
                    .unwrap_or(defaults.observability.metrics_enabled),
                loki_enabled: env
                    .flag("QUIZGATE_LOKI_ENABLED")?
                    .unwrap_or(defaults.observability.loki_enabled),
                loki_url: env
                    .string("QUIZGATE_LOKI_URL")
                    .unwrap_or(defaults.observability.loki_url),
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.server.base_url)
            .with_context(|| format!("Invalid BASE_URL: {}", self.server.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("BASE_URL must be an http(s) URL");
        }

        if self.access.recheck_interval_seconds == 0 {
            anyhow::bail!("Access recheck interval must be > 0");
        }

        if !(1..=MAX_SIGNUP_TOKEN_TTL_DAYS).contains(&self.auth.signup_token_ttl_days) {
            anyhow::bail!(
                "QUIZGATE_SIGNUP_TOKEN_TTL_DAYS must be between 1 and {MAX_SIGNUP_TOKEN_TTL_DAYS}"
            );
        }
        if !(1..=MAX_LOGIN_LINK_TTL_MINUTES).contains(&self.auth.login_link_ttl_minutes) {
            anyhow::bail!(
                "QUIZGATE_LOGIN_LINK_TTL_MINUTES must be between 1 and {MAX_LOGIN_LINK_TTL_MINUTES}"
            );
        }

        if self.access.debug_bypass_enabled {
            if self
                .access
                .debug_bypass_secret
                .as_deref()
                .is_none_or(str::is_empty)
            {
                anyhow::bail!("Debug bypass is enabled but QUIZGATE_DEBUG_BYPASS_SECRET is not set");
            }
            if self.is_production() {
                anyhow::bail!("Debug bypass cannot be enabled in production");
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.general.environment.eq_ignore_ascii_case("production")
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| anyhow::anyhow!("Invalid value for {key} ({raw}): {e}"))
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.string(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(anyhow::anyhow!("Invalid boolean for {key}: {raw}")),
            })
            .transpose()
    }
}
