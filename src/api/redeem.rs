//! Redemption endpoint used by the trusted redeemer client (chat bot).

use actix_web::{HttpResponse, post, web};

use crate::auth::RedeemerAuth;
use crate::error::{AppError, AppResult};
use crate::models::{RedeemRequest, RedeemResponse};
use crate::services::{KeyStore, PrivilegeScheduler};

/// Configure redemption routes.
pub fn configure_redeem_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(redeem);
}

/// Redeem a key for a subject and grant the privilege for the grant window.
///
/// POST /api/v1/redeem
/// Authorization: X-API-Key (redeemer client secret)
#[utoipa::path(
    post,
    path = "/api/v1/redeem",
    tag = "Keys",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Key redeemed, privilege granted", body = RedeemResponse),
        (status = 400, description = "Missing key or subject", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or wrong shared secret", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown key", body = crate::error::ErrorResponse),
        (status = 409, description = "Key already used or revoked", body = crate::error::ErrorResponse),
        (status = 410, description = "Key expired", body = crate::error::ErrorResponse),
        (status = 502, description = "Privilege grant failed", body = crate::error::ErrorResponse),
        (status = 503, description = "Storage unavailable", body = crate::error::ErrorResponse)
    ),
    security(
        ("api_key" = [])
    )
)]
#[post("/redeem")]
pub async fn redeem(
    _auth: RedeemerAuth,
    body: web::Json<RedeemRequest>,
    store: web::Data<KeyStore>,
    scheduler: web::Data<PrivilegeScheduler>,
) -> AppResult<HttpResponse> {
    let RedeemRequest { token, subject } = body.into_inner();
    let (Some(token), Some(subject)) = (token, subject) else {
        return Err(AppError::InvalidInput("missing key or subject".to_string()));
    };

    let redemption = store.redeem(&token, &subject).await?;
    scheduler.grant_timed(&redemption).await?;

    Ok(HttpResponse::Ok().json(RedeemResponse {
        ok: true,
        message: "key redeemed".to_string(),
    }))
}
