use crate::error::ApiError;
use actix_web::dev::Payload;
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};

const SDK_PREFIX: &str = "Bearer client.sdk.";

/// Caller identified by an SDK bearer token
///
/// Only the shape of the token is checked: `client.sdk.<client id>.<sha256 hex>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkClient {
    pub client_id: String,
}

impl SdkClient {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let unauthorized = || ApiError::Unauthorized("Missing or invalid SDK token".to_string());

        let value = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;
        let token = value.strip_prefix(SDK_PREFIX).ok_or_else(unauthorized)?;
        let (client_id, digest) = token.rsplit_once('.').ok_or_else(unauthorized)?;

        let well_formed = !client_id.is_empty()
            && digest.len() == 64
            && digest.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return Err(unauthorized());
        }

        Ok(Self {
            client_id: client_id.to_string(),
        })
    }
}

impl FromRequest for SdkClient {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req.headers()))
    }
}
