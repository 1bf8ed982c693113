//! Shared domain types and configuration for Catalog Pilot.

use thiserror::Error;

mod app_config;
pub mod catalog;
mod config;
pub mod plan;
pub mod work_orders;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use plan::SubscriptionPlan;
pub use work_orders::{PriceSnapshot, ProductPriceUpdate, WorkOrderStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown subscription plan: {0}")]
    UnknownPlan(String),
    #[error("unknown work order status: {0}")]
    UnknownWorkOrderStatus(String),
}
