//! Actor extraction from gateway-supplied headers.
//!
//! Authentication itself is an external collaborator: the upstream gateway
//! verifies the caller and stamps `x-actor-id` / `x-actor-role` onto the
//! proxied request. This extractor turns those headers into an explicit
//! [`Actor`] argument for the handlers; identity is never pulled from any
//! ambient context deeper in the call chain.

use crate::error::AppError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use turnstile_core::types::{Actor, ActorId, Role};
use uuid::Uuid;

/// Header carrying the authenticated principal's id (UUID).
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the authenticated principal's role (`USER` / `ADMIN`).
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated principal behind the current request.
#[derive(Clone, Copy, Debug)]
pub struct RequestActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| AppError::unauthorized("missing or invalid actor identity"))?;

        let role = parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or_else(|| AppError::unauthorized("missing or invalid actor role"))?;

        Ok(Self(Actor::new(ActorId::from_uuid(id), role)))
    }
}
