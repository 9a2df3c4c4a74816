use chrono::Utc;
use uuid::Uuid;

use super::Tenant;
use crate::db::{Certificate, CertificateStatus, Revocation, Store};
use crate::error::{AppError, AppResult};

pub const DEFAULT_REVOCATION_REASON: &str = "No reason provided";

/// Moves an issued certificate to `revoked`. A second attempt is a conflict.
pub async fn revoke<S: Store>(
    store: &S,
    tenant: Tenant,
    certificate_id: Uuid,
    reason: Option<String>,
) -> AppResult<Certificate> {
    let current = store
        .find_certificate(tenant.institute_id, certificate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate"))?;
    if current.status == CertificateStatus::Revoked {
        return Err(AppError::conflict("Certificate is already revoked"));
    }

    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REVOCATION_REASON.to_string());

    let revocation = Revocation {
        revoked_by: tenant.user_id,
        reason,
        revoked_at: Utc::now(),
    };

    // The store only updates rows still in `issued`; losing a race lands here.
    let revoked = store
        .revoke_certificate(tenant.institute_id, certificate_id, revocation)
        .await?
        .ok_or_else(|| AppError::conflict("Certificate is already revoked"))?;

    tracing::info!(
        code = %revoked.certificate_code,
        revoked_by = %tenant.user_id,
        "Certificate revoked"
    );
    Ok(revoked)
}
