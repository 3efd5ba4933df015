use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;

pub const ROLE_HEADER: &str = "x-actor-role";
pub const ID_HEADER: &str = "x-actor-id";

/// Caller identity taken from the `x-actor-role` / `x-actor-id` headers.
///
/// Authentication happens upstream; this only parses what the gateway
/// forwarded. The internal `system` role cannot be claimed over HTTP.
#[derive(Debug, Clone, Copy)]
pub struct ActorHeader(pub Actor);

impl ActorHeader {
    pub fn customer_id(&self) -> Result<Uuid, AppError> {
        match self.0 {
            Actor::Customer(id) => Ok(id),
            _ => Err(AppError::Forbidden("only customers may do this".to_string())),
        }
    }

    pub fn driver_id(&self) -> Result<Uuid, AppError> {
        match self.0 {
            Actor::Driver(id) => Ok(id),
            _ => Err(AppError::Forbidden("only drivers may do this".to_string())),
        }
    }

    /// Customer or driver id; payment callers have no user identity.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        self.0.user_id().ok_or_else(|| {
            AppError::Forbidden("a customer or driver identity is required".to_string())
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ActorHeader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = header(parts, ROLE_HEADER)?
            .ok_or_else(|| AppError::Forbidden(format!("missing {ROLE_HEADER} header")))?;

        let id = || -> Result<Uuid, AppError> {
            let raw = header(parts, ID_HEADER)?
                .ok_or_else(|| AppError::Forbidden(format!("missing {ID_HEADER} header")))?;
            Uuid::parse_str(raw.trim())
                .map_err(|_| AppError::Validation(format!("{ID_HEADER} must be a uuid")))
        };

        let actor = match role.trim() {
            "customer" => Actor::Customer(id()?),
            "driver" => Actor::Driver(id()?),
            "payment" => Actor::Payment,
            other => {
                return Err(AppError::Forbidden(format!("unknown actor role '{other}'")));
            }
        };

        Ok(ActorHeader(actor))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::Validation(format!("{name} is not valid text")))
        })
        .transpose()
}
