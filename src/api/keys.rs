//! Key generation and listing endpoints.

use std::time::Duration;

use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AdminAuth;
use crate::config::KeyPolicy;
use crate::error::AppResult;
use crate::models::{GenerateKeyRequest, KeyCreatedResponse, KeyListItem, ListKeysQuery};
use crate::services::KeyStore;
use crate::services::key_store::DEFAULT_LIST_LIMIT;

/// Configure key routes.
pub fn configure_key_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(generate_key)
        .service(list_keys)
        .service(claim_key);
}

/// Response for listing keys.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListKeysResponse {
    pub keys: Vec<KeyListItem>,
}

/// Mint a new key.
///
/// POST /api/v1/keys
/// Authorization: X-Admin-Key
#[utoipa::path(
    post,
    path = "/api/v1/keys",
    tag = "Keys",
    request_body = GenerateKeyRequest,
    responses(
        (status = 201, description = "Key created", body = KeyCreatedResponse),
        (status = 400, description = "Invalid validity", body = crate::error::ErrorResponse),
        (status = 401, description = "Admin key required", body = crate::error::ErrorResponse)
    ),
    security(
        ("admin_key" = [])
    )
)]
#[post("/keys")]
pub async fn generate_key(
    _auth: AdminAuth,
    body: Option<web::Json<GenerateKeyRequest>>,
    store: web::Data<KeyStore>,
    policy: web::Data<KeyPolicy>,
) -> AppResult<HttpResponse> {
    let validity = body
        .and_then(|b| b.into_inner().valid_for_secs)
        .map(Duration::from_secs)
        .unwrap_or(policy.default_validity);

    let key = store.generate(validity).await?;

    Ok(HttpResponse::Created().json(KeyCreatedResponse::from(key)))
}

/// List the most recent keys, newest first.
///
/// GET /api/v1/keys?limit=N
/// Authorization: X-Admin-Key
#[utoipa::path(
    get,
    path = "/api/v1/keys",
    tag = "Keys",
    params(
        ("limit" = Option<u64>, Query, description = "Number of keys (default: 50, max: 500)")
    ),
    responses(
        (status = 200, description = "Most recent keys", body = ListKeysResponse),
        (status = 401, description = "Admin key required", body = crate::error::ErrorResponse)
    ),
    security(
        ("admin_key" = [])
    )
)]
#[get("/keys")]
pub async fn list_keys(
    _auth: AdminAuth,
    query: web::Query<ListKeysQuery>,
    store: web::Data<KeyStore>,
) -> AppResult<HttpResponse> {
    let keys = store
        .list_recent(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;

    Ok(HttpResponse::Ok().json(ListKeysResponse {
        keys: keys.into_iter().map(KeyListItem::from).collect(),
    }))
}

/// Claim a fresh key from the public page.
///
/// GET /api/v1/claim
#[utoipa::path(
    get,
    path = "/api/v1/claim",
    tag = "Keys",
    responses(
        (status = 201, description = "Key created", body = KeyCreatedResponse),
        (status = 503, description = "Storage unavailable", body = crate::error::ErrorResponse)
    )
)]
#[get("/claim")]
pub async fn claim_key(
    store: web::Data<KeyStore>,
    policy: web::Data<KeyPolicy>,
) -> AppResult<HttpResponse> {
    let key = store.generate(policy.claim_validity).await?;

    Ok(HttpResponse::Created().json(KeyCreatedResponse::from(key)))
}
