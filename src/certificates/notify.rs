//! Handing issued certificates to the student by email.

use chrono::Utc;
use std::future::Future;
use uuid::Uuid;

use super::Tenant;
use crate::db::{Certificate, CertificateStatus, Store};
use crate::error::{AppError, AppResult};

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier: Send + Sync {
    fn send(&self, certificate: &Certificate) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Records the dispatch in the log instead of talking to a mail relay.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    public_base_url: String,
}

impl LogNotifier {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
        }
    }
}

impl Notifier for LogNotifier {
    async fn send(&self, certificate: &Certificate) -> Result<(), NotifyError> {
        tracing::info!(
            code = %certificate.certificate_code,
            student = %certificate.student_name,
            download = %format!("{}{}", self.public_base_url, certificate.certificate_url),
            verify = %certificate.qr_code_data,
            "Certificate email dispatched"
        );
        Ok(())
    }
}

pub async fn send_email<S: Store, N: Notifier>(
    store: &S,
    notifier: &N,
    tenant: Tenant,
    certificate_id: Uuid,
) -> AppResult<Certificate> {
    let certificate = store
        .find_certificate(tenant.institute_id, certificate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate"))?;
    if certificate.status == CertificateStatus::Revoked {
        return Err(AppError::conflict("Cannot email a revoked certificate"));
    }

    notifier
        .send(&certificate)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    store
        .mark_email_sent(tenant.institute_id, certificate.id, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("Certificate"))
}
