//! Server configuration from flags and environment.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Args};
use inkra_core::lifecycle::{LifecycleConfig, DEFAULT_MAX_FILE_SIZE};

#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// Secret used to sign login tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Admin login created on first run
    #[arg(long, env = "ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Directory holding app.db
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Directory holding uploads/ and signed/
    #[arg(long, env = "DOCS_DIR", default_value = inkra_core::blob::DEFAULT_DOCS_DIR)]
    pub docs_dir: PathBuf,

    /// Built frontend served for non-API paths
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Maximum upload size in bytes
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,

    /// Take the client address from X-Forwarded-For / X-Real-IP
    #[arg(
        long,
        env = "TRUST_PROXY_HEADERS",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub trust_proxy_headers: bool,

    /// Allowed CORS origin; any origin when unset
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Requests per minute per client address; 0 disables limiting
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit_per_minute: u32,
}

/// Settings consumed by the router.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub docs_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
    pub trust_proxy_headers: bool,
    pub cors_origin: Option<String>,
    pub rate_limit_per_minute: u32,
}

pub const DEFAULT_RATE_LIMIT: u32 = 100;

const BODY_OVERHEAD: u64 = 1024 * 1024;

impl ServerArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn jwt_secret(&self) -> anyhow::Result<&str> {
        self.jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            max_file_size: self.max_file_size,
        }
    }

    pub fn server(&self) -> ServerConfig {
        let max_body = self.max_file_size.saturating_add(BODY_OVERHEAD);
        ServerConfig {
            docs_dir: self.docs_dir.clone(),
            static_dir: self.static_dir.clone(),
            max_body_bytes: usize::try_from(max_body).unwrap_or(usize::MAX),
            trust_proxy_headers: self.trust_proxy_headers,
            cors_origin: self.cors_origin.clone(),
            rate_limit_per_minute: self.rate_limit_per_minute,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from(inkra_core::blob::DEFAULT_DOCS_DIR),
            static_dir: None,
            max_body_bytes: (DEFAULT_MAX_FILE_SIZE + BODY_OVERHEAD) as usize,
            trust_proxy_headers: true,
            cors_origin: None,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT,
        }
    }
}
