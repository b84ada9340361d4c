use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Port for the REST API (bound on 0.0.0.0).
    #[arg(long, env = "HTTP_PORT", default_value = "5000")]
    pub http_port: u16,

    /// Host address and port for the realtime WebSocket server.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional admin key required for directory reloads (X-API-Key header).
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Allowed CORS origin for the REST API. Any origin when unset.
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    // --- Identity Args ---
    /// Secret used to verify signed identity tokens.
    #[arg(long, env = "JWT_SECRET", default_value = "dev_secret")]
    pub token_secret: String,

    /// Lifetime in seconds of tokens issued by this process.
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "86400")]
    pub token_ttl_secs: i64,

    // --- Store Args ---
    /// Conversation/message store type (memory, redis)
    #[arg(long, env = "STORE_TYPE", default_value = "memory")]
    pub store_type: String,

    /// Store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub store_host: String,

    /// Prefix for Redis keys.
    #[arg(long, env = "STORE_REDIS_PREFIX", default_value = "chat:")]
    pub store_redis_prefix: String,

    /// Path to the employee directory JSON file.
    #[arg(long, env = "EMPLOYEES_PATH", default_value = "json/employees.json")]
    pub employees_path: String,

    // --- Messaging Args ---
    /// Maximum accepted sends per sender within one window.
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "30")]
    pub rate_limit_max: u32,

    /// Rate limit window length in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: i64,

    /// Outbound buffer per realtime session; events beyond it are dropped.
    #[arg(long, env = "WS_CHANNEL_CAPACITY", default_value = "64")]
    pub ws_channel_capacity: usize,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS/HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS/HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        if !self.enable_tls {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}
