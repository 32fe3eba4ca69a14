use std::str::FromStr;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    pub database_url: String,
    /// Shared volume the API stages uploads on (default: `/shared`).
    pub staging_dir: String,
    /// Base URL of the content renderer service.
    pub renderer_url: String,
    /// Upper bound for a single render call in seconds (default: `600`).
    pub render_timeout_secs: u64,
    /// How long shutdown waits for running jobs before failing them
    /// (default: `25`).
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default    |
    /// |-----------------------|------------|
    /// | `HOST`                | `0.0.0.0`  |
    /// | `PORT`                | `8080`     |
    /// | `DATABASE_URL`        | (required) |
    /// | `STAGING_DIR`         | `/shared`  |
    /// | `RENDERER_URL`        | (required) |
    /// | `RENDER_TIMEOUT_SECS` | `600`      |
    /// | `SHUTDOWN_GRACE_SECS` | `25`       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_or("PORT", 8080)?,
            database_url: required("DATABASE_URL")?,
            staging_dir: var_or("STAGING_DIR", "/shared"),
            renderer_url: required("RENDERER_URL")?
                .trim_end_matches('/')
                .to_string(),
            render_timeout_secs: parse_or("RENDER_TIMEOUT_SECS", 600)?,
            shutdown_grace_secs: parse_or("SHUTDOWN_GRACE_SECS", 25)?,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
