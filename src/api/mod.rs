//! API endpoint modules.

pub mod health;
pub mod keys;
pub mod openapi;
pub mod redeem;

use actix_web::web;

use crate::error::AppError;

pub use health::configure_health_routes;
pub use keys::configure_key_routes;
pub use openapi::{ApiDoc, configure_openapi_routes};
pub use redeem::configure_redeem_routes;

/// Request bodies are tiny; malformed ones are reported as `INVALID_INPUT`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(4096)
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into())
}

/// Query strings that fail to parse are reported as `INVALID_INPUT`.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into())
}
