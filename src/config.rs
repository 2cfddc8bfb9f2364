use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Per-tenant bucket-count limit applied at create time.
const DEFAULT_MAX_BUCKETS_PER_OWNER: u32 = 10;

/// Global per-tenant storage cap in bytes (1 GiB).
const DEFAULT_TENANT_STORAGE_LIMIT: i64 = 1024 * 1024 * 1024;

/// Remote-call timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Base URL of the backend's bucket-management (control-plane) API.
    pub bucket_api_url: String,
    /// Base URL of the backend's S3-style object (data-plane) API.
    pub object_api_url: String,
    /// Bearer token presented to both backend planes.
    pub backend_token: String,
    pub request_timeout_secs: u64,
    pub max_buckets_per_owner: u32,
    pub tenant_storage_limit_bytes: i64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Metered storage gateway")]
pub struct Args {
    /// Host to bind to (overrides STORE_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STORE_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides STORE_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Backend bucket API base URL (overrides STORE_GATEWAY_BUCKET_API_URL)
    #[arg(long)]
    pub bucket_api_url: Option<String>,

    /// Backend object API base URL (overrides STORE_GATEWAY_OBJECT_API_URL)
    #[arg(long)]
    pub object_api_url: Option<String>,

    /// Backend bearer token (overrides STORE_GATEWAY_BACKEND_TOKEN)
    #[arg(long)]
    pub backend_token: Option<String>,

    /// Remote-call timeout in seconds (overrides STORE_GATEWAY_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Buckets allowed per tenant (overrides STORE_GATEWAY_MAX_BUCKETS_PER_OWNER)
    #[arg(long)]
    pub max_buckets_per_owner: Option<u32>,

    /// Total bytes allowed per tenant (overrides STORE_GATEWAY_TENANT_STORAGE_LIMIT_BYTES)
    #[arg(long)]
    pub tenant_storage_limit_bytes: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("STORE_GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("STORE_GATEWAY_PORT", 3000u16)?;
        let env_db = env::var("STORE_GATEWAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/store_gateway.db".into());
        let env_bucket_api = env::var("STORE_GATEWAY_BUCKET_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9300".into());
        let env_object_api = env::var("STORE_GATEWAY_OBJECT_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9301".into());
        let env_token = env::var("STORE_GATEWAY_BACKEND_TOKEN").unwrap_or_default();
        let env_timeout =
            env_parsed("STORE_GATEWAY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let env_max_buckets =
            env_parsed("STORE_GATEWAY_MAX_BUCKETS_PER_OWNER", DEFAULT_MAX_BUCKETS_PER_OWNER)?;
        let env_storage_limit = env_parsed(
            "STORE_GATEWAY_TENANT_STORAGE_LIMIT_BYTES",
            DEFAULT_TENANT_STORAGE_LIMIT,
        )?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            bucket_api_url: args.bucket_api_url.unwrap_or(env_bucket_api),
            object_api_url: args.object_api_url.unwrap_or(env_object_api),
            backend_token: args.backend_token.unwrap_or(env_token),
            request_timeout_secs: args.request_timeout_secs.unwrap_or(env_timeout),
            max_buckets_per_owner: args.max_buckets_per_owner.unwrap_or(env_max_buckets),
            tenant_storage_limit_bytes: args
                .tenant_storage_limit_bytes
                .unwrap_or(env_storage_limit),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read a numeric environment variable, falling back to `default` when the
/// variable is not set.
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {}", key)),
    }
}
