//! Server Configuration

/// Fallback session signing key; never use in production
pub const DEV_SECRET_KEY: &str = "dev-secret-change-me";

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Values the HTTP layer reads at startup
#[derive(Clone)]
pub struct AppConfig {
    /// Public origin used in QR codes, emails and checkout return URLs
    pub base_url: String,

    /// Signs the dashboard session cookie
    pub secret_key: String,

    /// `None` selects the in-memory store
    pub database_url: Option<String>,

    pub bind_addr: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("base_url", &self.base_url)
            .field("secret_key", &"[redacted]")
            .field("database_url", &self.database_url.as_ref().map(|_| "[set]"))
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            secret_key: DEV_SECRET_KEY.into(),
            database_url: None,
            bind_addr: DEFAULT_BIND_ADDR.into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let secret_key = std::env::var("SECRET_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEV_SECRET_KEY.into());
        let database_url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());

        Self {
            base_url,
            secret_key,
            database_url,
            bind_addr,
        }
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.secret_key == DEV_SECRET_KEY
    }

    /// Absolute URL for a path on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Cookies get `Secure` when served over https
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}
