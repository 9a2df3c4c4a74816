use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::certificates::issuance::{BulkIssueRequest, IssueRequest};
use crate::certificates::listing::{list, ListQuery};
use crate::certificates::notify::send_email;
use crate::certificates::revocation::revoke;
use crate::certificates::verification::verify;
use crate::certificates::Tenant;
use crate::db::Store;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::artifact_path;

fn ok(message: &str, data: impl serde::Serialize) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message,
        "data": data
    }))
}

/// An id that does not parse cannot name an existing certificate.
fn certificate_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found("Certificate"))
}

pub async fn verify_certificate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<Value>> {
    let verification = verify(&state.store, &code).await?;
    let message = if verification.is_valid() {
        "Certificate is valid"
    } else {
        "Certificate has been revoked"
    };
    Ok(Json(json!({
        "success": true,
        "valid": verification.is_valid(),
        "message": message,
        "data": verification
    })))
}

pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    payload: Result<Json<IssueRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload?;
    let certificate = state.issuer().issue(tenant, request).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        ok("Certificate issued successfully", certificate),
    ))
}

pub async fn bulk_issue(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    payload: Result<Json<BulkIssueRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(request) = payload?;
    let report = state.issuer().bulk_issue(tenant, request).await?;
    let message = format!(
        "{} certificates issued, {} failed",
        report.success_count, report.failure_count
    );
    Ok(ok(&message, report))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeBody {
    pub reason: Option<String>,
}

pub async fn revoke_certificate(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
    body: Option<Json<RevokeBody>>,
) -> AppResult<Json<Value>> {
    let reason = body.and_then(|Json(body)| body.reason);
    let certificate = revoke(&state.store, tenant, certificate_id(&id)?, reason).await?;
    Ok(ok("Certificate revoked successfully", certificate))
}

pub async fn send_certificate_email(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let certificate = send_email(&state.store, &state.notifier, tenant, certificate_id(&id)?).await?;
    Ok(ok("Certificate email sent", certificate))
}

pub async fn regenerate_certificate(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let certificate = state.issuer().regenerate(tenant, certificate_id(&id)?).await?;
    Ok(ok("Certificate regenerated", certificate))
}

pub async fn get_certificate(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let certificate = state
        .store
        .find_certificate(tenant.institute_id, certificate_id(&id)?)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate"))?;
    Ok(ok("Certificate found", certificate))
}

pub async fn list_certificates(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let page = list(&state.store, tenant, query).await?;
    Ok(ok("Certificates retrieved", page))
}

/// Streams the PDF, rendering it first when the file is missing.
pub async fn download_certificate(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = certificate_id(&id)?;
    let mut certificate = state
        .store
        .find_certificate(tenant.institute_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate"))?;

    let folder = &state.config.certificates_folder;
    let on_disk = artifact_path(folder, &certificate.certificate_url).filter(|path| path.exists());
    let path = match on_disk {
        Some(path) => path,
        None => {
            tracing::info!(code = %certificate.certificate_code, "PDF missing, regenerating before download");
            certificate = state.issuer().regenerate(tenant, id).await?;
            artifact_path(folder, &certificate.certificate_url).ok_or_else(|| {
                AppError::Persistence(format!(
                    "regenerated certificate has unusable url {:?}",
                    certificate.certificate_url
                ))
            })?
        }
    };

    let content = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Persistence(format!("reading {}: {}", path.display(), e)))?;

    let download_name = format!("{}.pdf", certificate.certificate_code);
    let mime = mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or("application/octet-stream");

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name),
            ),
        ],
        content,
    ))
}
