use comfyfile_core::InstanceConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except
/// `SECURITY_SECRET`, which is required once `SECURITY_ENABLED` is on.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Redis connection URL.
    pub redis_url: String,
    /// Seconds between instance health sweeps (default: `10`).
    pub health_check_interval_secs: u64,
    /// Per-probe timeout in seconds (default: `5`).
    pub probe_timeout_secs: u64,
    /// How long a submit-and-wait request blocks before timing out,
    /// in seconds (default: `7200`).
    pub result_timeout_secs: u64,
    /// Whether every API request must carry the shared secret.
    pub security_enabled: bool,
    /// The shared secret checked when security is enabled.
    pub security_secret: Option<String>,
    /// Backend instances registered at startup.
    pub instances: Vec<InstanceConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `3000`                     |
    /// | `REDIS_URL`                  | `redis://127.0.0.1:6379`   |
    /// | `HEALTH_CHECK_INTERVAL_SECS` | `10`                       |
    /// | `PROBE_TIMEOUT_SECS`         | `5`                        |
    /// | `RESULT_TIMEOUT_SECS`        | `7200`                     |
    /// | `SECURITY_ENABLED`           | `false`                    |
    /// | `SECURITY_SECRET`            | unset                      |
    /// | `COMFYFILE_INSTANCES`        | `[]`                       |
    ///
    /// `COMFYFILE_INSTANCES` is a JSON array of
    /// `{"url": "http://host:port", "token": "optional"}` objects.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());

        let health_check_interval_secs: u64 = std::env::var("HEALTH_CHECK_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("HEALTH_CHECK_INTERVAL_SECS must be a valid u64");

        let probe_timeout_secs: u64 = std::env::var("PROBE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("PROBE_TIMEOUT_SECS must be a valid u64");

        let result_timeout_secs: u64 = std::env::var("RESULT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "7200".into())
            .parse()
            .expect("RESULT_TIMEOUT_SECS must be a valid u64");

        let security_enabled = std::env::var("SECURITY_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let security_secret = std::env::var("SECURITY_SECRET").ok();
        if security_enabled && security_secret.is_none() {
            panic!("SECURITY_SECRET must be set when SECURITY_ENABLED is on");
        }

        let instances: Vec<InstanceConfig> = match std::env::var("COMFYFILE_INSTANCES") {
            Ok(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(&raw).expect("COMFYFILE_INSTANCES must be a JSON array")
            }
            _ => Vec::new(),
        };

        Self {
            host,
            port,
            redis_url,
            health_check_interval_secs,
            probe_timeout_secs,
            result_timeout_secs,
            security_enabled,
            security_secret,
            instances,
        }
    }
}
