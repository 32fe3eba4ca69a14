use std::str::FromStr;

/// Server configuration loaded from environment variables.
///
/// Everything except the two service URLs has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Not applied to the
    /// status stream.
    pub request_timeout_secs: u64,
    pub database_url: String,
    /// Base URL of the worker service.
    pub slides_service_url: String,
    /// Bound on the dispatch round trip in seconds (default: `30`).
    pub dispatch_timeout_secs: u64,
    /// Shared volume uploads are staged on (default: `/shared`).
    pub staging_dir: String,
    /// A non-terminal job idle for longer than this is failed (default: `1800`).
    pub processing_deadline_secs: u64,
    /// Maximum accepted upload body in bytes (default: 50 MiB).
    pub max_upload_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `DATABASE_URL`             | (required)              |
    /// | `SLIDES_SERVICE_URL`       | (required)              |
    /// | `DISPATCH_TIMEOUT_SECS`    | `30`                    |
    /// | `STAGING_DIR`              | `/shared`               |
    /// | `PROCESSING_DEADLINE_SECS` | `1800`                  |
    /// | `MAX_UPLOAD_BYTES`         | `52428800`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_origins: Vec<String> = var_or("CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let processing_deadline_secs: u64 = parse_or("PROCESSING_DEADLINE_SECS", 1800)?;
        if processing_deadline_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PROCESSING_DEADLINE_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_or("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 30)?,
            database_url: required("DATABASE_URL")?,
            slides_service_url: required("SLIDES_SERVICE_URL")?
                .trim_end_matches('/')
                .to_string(),
            dispatch_timeout_secs: parse_or("DISPATCH_TIMEOUT_SECS", 30)?,
            staging_dir: var_or("STAGING_DIR", "/shared"),
            processing_deadline_secs,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
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
