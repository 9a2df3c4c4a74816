pub mod api;
pub mod pages;
pub mod tenant;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

/// Routes mounted under `/api/certificates`.
pub fn certificate_api() -> Router<Arc<AppState>> {
    Router::new()
        .route("/verify/:code", get(api::verify_certificate))
        .route("/", post(api::issue_certificate).get(api::list_certificates))
        .route("/bulk-issue", post(api::bulk_issue))
        .route("/:id", get(api::get_certificate))
        .route("/:id/revoke", put(api::revoke_certificate))
        .route("/:id/send-email", post(api::send_certificate_email))
        .route("/:id/regenerate", post(api::regenerate_certificate))
        .route("/:id/download", get(api::download_certificate))
}
