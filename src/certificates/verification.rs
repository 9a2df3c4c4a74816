//! Public, unauthenticated certificate lookup.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::db::{Certificate, CertificateStatus, Store};
use crate::error::{AppError, AppResult};

/// What a relying party learns about a code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Verification {
    Valid(ValidCertificate),
    Revoked(RevokedCertificate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidCertificate {
    pub certificate_code: String,
    pub student_name: String,
    pub course_name: String,
    pub award_date: NaiveDate,
    pub institute_name: String,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
}

/// Proves the code existed while withholding award date and issuer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedCertificate {
    pub certificate_code: String,
    pub student_name: String,
    pub course_name: String,
    pub status: CertificateStatus,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }
}

/// Codes are printed uppercase; accept whatever a human typed.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub async fn verify<S: Store>(store: &S, code: &str) -> AppResult<Verification> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(AppError::validation("certificate code is required"));
    }

    let certificate = store
        .find_certificate_by_code(&code)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate"))?;

    match certificate.status {
        CertificateStatus::Revoked => Ok(Verification::Revoked(revoked_view(certificate))),
        CertificateStatus::Issued => {
            let institute_name = store
                .find_institute(certificate.institute_id)
                .await?
                .map(|institute| institute.name)
                .unwrap_or_default();
            Ok(Verification::Valid(ValidCertificate {
                certificate_code: certificate.certificate_code,
                student_name: certificate.student_name,
                course_name: certificate.course_name,
                award_date: certificate.award_date,
                institute_name,
                status: certificate.status,
                issued_at: certificate.metadata.issued_at,
            }))
        }
    }
}

fn revoked_view(certificate: Certificate) -> RevokedCertificate {
    RevokedCertificate {
        certificate_code: certificate.certificate_code,
        student_name: certificate.student_name,
        course_name: certificate.course_name,
        status: certificate.status,
        revoked_at: certificate.revoked_at,
    }
}
