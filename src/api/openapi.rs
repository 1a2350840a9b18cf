//! OpenAPI documentation configuration.

use actix_web::{HttpResponse, get, web};
use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

use crate::config::{ADMIN_KEY_HEADER, API_KEY_HEADER};
use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keygate",
        version = "0.1.0",
        description = "Single-use access keys that grant a privilege for a fixed window"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        api::health::health,
        api::health::ready,
        api::redeem::redeem,
        api::keys::generate_key,
        api::keys::list_keys,
        api::keys::claim_key,
    ),
    components(
        schemas(
            error::ErrorResponse,
            api::health::HealthResponse,
            api::health::ReadyResponse,
            api::keys::ListKeysResponse,
            models::KeyStatus,
            models::GenerateKeyRequest,
            models::KeyCreatedResponse,
            models::KeyListItem,
            models::ListKeysQuery,
            models::RedeemRequest,
            models::RedeemResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Keys", description = "Key generation, listing and redemption")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add the shared-secret header schemes.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_KEY_HEADER))),
            );
        }
    }
}

/// Serve the OpenAPI document.
#[get("/openapi.json")]
pub async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Configure the documentation route.
pub fn configure_openapi_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(openapi_json);
}
