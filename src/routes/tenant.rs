use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::certificates::Tenant;

pub const INSTITUTE_HEADER: &str = "x-institute-id";
pub const USER_HEADER: &str = "x-user-id";

/// The request carried no usable tenant context.
#[derive(Debug)]
pub struct MissingTenant(&'static str);

impl IntoResponse for MissingTenant {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "success": false,
                "message": format!("missing or malformed {} header", self.0)
            })),
        )
            .into_response()
    }
}

fn header_uuid(headers: &HeaderMap, name: &'static str) -> Result<Uuid, MissingTenant> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(MissingTenant(name))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = MissingTenant;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Tenant {
            institute_id: header_uuid(&parts.headers, INSTITUTE_HEADER)?,
            user_id: header_uuid(&parts.headers, USER_HEADER)?,
        })
    }
}
