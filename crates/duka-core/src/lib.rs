use thiserror::Error;

pub mod app_config;
pub mod cart;
pub mod catalog;
pub mod config;

pub use app_config::{AppConfig, Environment};
pub use cart::{normalize_quantity, CartIdentity};
pub use catalog::{
    normalize_slug, total_variant_stock, NewImage, NewProduct, NewVariant, ProductPatch,
    VariantPatch,
};
pub use config::{load_app_config, load_app_config_from_env};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
