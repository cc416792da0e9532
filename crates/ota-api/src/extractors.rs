//! # Credential Extractors
//!
//! Resolve the calling application from its credential header before the
//! handler runs. Publishers send `x-publisher-key`; consumers send
//! `x-consumer-key`. A missing or unknown key is rejected with 401, and a
//! key only resolves in the role it was issued for.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use ota_core::AppId;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying a publisher credential.
pub const PUBLISHER_KEY_HEADER: &str = "x-publisher-key";
/// Header carrying a consumer credential.
pub const CONSUMER_KEY_HEADER: &str = "x-consumer-key";

/// The application identified by a publisher credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherApp(pub AppId);

/// The application identified by a consumer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerApp(pub AppId);

fn credential<'a>(parts: &'a Parts, header: &str) -> Result<&'a str, AppError> {
    let value = parts
        .headers
        .get(header)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {header} header")))?;
    value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("malformed {header} header")))
}

impl<S> FromRequestParts<S> for PublisherApp
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = credential(parts, PUBLISHER_KEY_HEADER)?;
        let state = AppState::from_ref(state);
        state
            .registry
            .resolve_publisher(key)
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("unknown publisher key".into()))
    }
}

impl<S> FromRequestParts<S> for ConsumerApp
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = credential(parts, CONSUMER_KEY_HEADER)?;
        let state = AppState::from_ref(state);
        state
            .registry
            .resolve_consumer(key)
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("unknown consumer key".into()))
    }
}
