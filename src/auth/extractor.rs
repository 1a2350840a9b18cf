//! Actix-web extractors for shared-secret authentication.
//!
//! Header values are wrapped in `SecretString` as soon as they are read and
//! are never logged.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};
use secrecy::{ExposeSecret, SecretString};

use super::{AdminKey, ApiSecret, SharedSecret};
use crate::config::{ADMIN_KEY_HEADER, API_KEY_HEADER};
use crate::error::AppError;

/// Extract a secret header value. Missing or non UTF-8 headers yield `None`.
fn extract_secret_header(req: &HttpRequest, header_name: &str) -> Option<SecretString> {
    req.headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| SecretString::from(s.to_string()))
}

/// Authentication error for extractors; renders as [`AppError::Unauthorized`].
#[derive(Debug)]
pub struct AuthError(AppError);

impl AuthError {
    fn new(message: impl Into<String>) -> Self {
        Self(AppError::Unauthorized(message.into()))
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        self.0.error_response()
    }
}

fn check(req: &HttpRequest, stored: Option<&SharedSecret>, header: &str) -> Result<(), AuthError> {
    let Some(stored) = stored.filter(|s| s.is_configured()) else {
        return Err(AuthError::new(format!("{} authentication is disabled", header)));
    };

    match extract_secret_header(req, header) {
        Some(provided) if stored.verify(provided.expose_secret()) => Ok(()),
        Some(_) => Err(AuthError::new(format!("Invalid {} header", header))),
        None => Err(AuthError::new(format!("Missing {} header", header))),
    }
}

/// Requires a valid `X-Admin-Key` header.
#[derive(Debug)]
pub struct AdminAuth;

impl FromRequest for AdminAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let stored = req.app_data::<web::Data<AdminKey>>().map(|k| &k.0);
        ready(check(req, stored, ADMIN_KEY_HEADER).map(|_| AdminAuth))
    }
}

/// Requires the redeemer client's `X-API-Key` header.
#[derive(Debug)]
pub struct RedeemerAuth;

impl FromRequest for RedeemerAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let stored = req.app_data::<web::Data<ApiSecret>>().map(|s| &s.0);
        ready(check(req, stored, API_KEY_HEADER).map(|_| RedeemerAuth))
    }
}
