use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL for the BigCommerce API. Overridable so tests and staging
    /// environments can point the whole service at a mock server.
    pub bigcommerce_api_base: String,
    pub bigcommerce_request_timeout_secs: u64,
    pub bigcommerce_max_retries: u32,
    pub bigcommerce_retry_backoff_base_secs: u64,
    /// Products requested per catalog page during sync (BigCommerce caps at 250).
    pub sync_page_size: u32,
    pub sync_inter_page_delay_ms: u64,
    /// Pacing delay between individual price updates within a work order batch.
    pub work_order_inter_update_delay_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("bigcommerce_api_base", &self.bigcommerce_api_base)
            .field(
                "bigcommerce_request_timeout_secs",
                &self.bigcommerce_request_timeout_secs,
            )
            .field("bigcommerce_max_retries", &self.bigcommerce_max_retries)
            .field(
                "bigcommerce_retry_backoff_base_secs",
                &self.bigcommerce_retry_backoff_base_secs,
            )
            .field("sync_page_size", &self.sync_page_size)
            .field("sync_inter_page_delay_ms", &self.sync_inter_page_delay_ms)
            .field(
                "work_order_inter_update_delay_ms",
                &self.work_order_inter_update_delay_ms,
            )
            .finish()
    }
}
