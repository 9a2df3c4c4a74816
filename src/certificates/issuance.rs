//! Issuing certificates, one at a time or in batches.
//!
//! Issuance runs in three phases. Identity (code, verification URL, QR) is
//! derived first, the PDF is rendered second and may fail softly, and the
//! record is persisted last. Persistence is the commit point: once the row is
//! written the certificate is valid whether or not a PDF exists.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::code::generate_certificate_code;
use super::link::verification_url;
use super::qr::encode_data_url;
use super::Tenant;
use crate::db::{
    Certificate, Course, Institute, NewCertificate, Store, StoreError, Student, Template,
    ENROLLMENT_COMPLETED,
};
use crate::error::{AppError, AppResult};
use crate::pdf::{RenderError, RenderJob, RenderedPdf, Renderer};
use crate::storage::{artifact_url, AssetLoader};

/// Attempts at allocating a unique code before giving up.
const CODE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone)]
pub struct IssueSettings {
    pub base_url: String,
    pub code_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub template_id: Option<String>,
    pub award_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIssueItem {
    pub student_email: Option<String>,
    pub course_code: Option<String>,
    pub template_id: Option<String>,
    pub award_date: Option<String>,
}

/// `certificates` must be a non-empty array; `templateId` and `awardDate`
/// apply to every item that does not carry its own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIssueRequest {
    #[serde(default)]
    pub certificates: Value,
    pub template_id: Option<String>,
    pub award_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSuccess {
    pub student_email: String,
    pub course_code: String,
    pub certificate_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIssueReport {
    pub successful: Vec<BulkSuccess>,
    /// Each entry is the original item with an added `error` field.
    pub failed: Vec<Value>,
    pub success_count: usize,
    pub failure_count: usize,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_id(raw: &str, field: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation(format!("{} is not a valid id", field)))
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_award_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| AppError::validation(format!("awardDate {:?} is not a valid date", raw)))
}

/// Everything a render needs besides the certificate's own fields.
struct Decorations {
    institute_name: String,
    background: Option<Vec<u8>>,
    logo: Option<Vec<u8>>,
    signature: Option<Vec<u8>>,
}

/// Snapshot fields printed on the PDF.
struct Printable<'a> {
    code: &'a str,
    student_name: &'a str,
    course_name: &'a str,
    award_date: NaiveDate,
    qr_code: &'a str,
}

pub struct Issuer<'a, S, R> {
    pub store: &'a S,
    pub renderer: &'a R,
    pub assets: &'a AssetLoader,
    pub settings: &'a IssueSettings,
}

impl<'a, S: Store, R: Renderer> Issuer<'a, S, R> {
    /// Issues one certificate. Preconditions are checked in order and each
    /// maps to its own error before anything is generated.
    pub async fn issue(&self, tenant: Tenant, request: IssueRequest) -> AppResult<Certificate> {
        let (Some(student_id), Some(course_id), Some(template_id), Some(award_date)) = (
            present(&request.student_id),
            present(&request.course_id),
            present(&request.template_id),
            present(&request.award_date),
        ) else {
            return Err(AppError::validation(
                "studentId, courseId, templateId and awardDate are required",
            ));
        };
        let student_id = parse_id(student_id, "studentId")?;
        let course_id = parse_id(course_id, "courseId")?;
        let template_id = parse_id(template_id, "templateId")?;
        let award_date = parse_award_date(award_date)?;

        let student = self
            .store
            .find_student(tenant.institute_id, student_id)
            .await?
            .ok_or_else(|| AppError::not_found("Student"))?;
        let course = self
            .store
            .find_course(tenant.institute_id, course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Course"))?;
        let template = self.template(tenant, template_id).await?;

        self.issue_for(tenant, &student, &course, &template, award_date).await
    }

    /// Issues every item independently; a failing item never aborts the batch.
    pub async fn bulk_issue(
        &self,
        tenant: Tenant,
        request: BulkIssueRequest,
    ) -> AppResult<BulkIssueReport> {
        let items = match request.certificates.as_array() {
            Some(items) if !items.is_empty() => items,
            _ => {
                return Err(AppError::validation(
                    "certificates must be a non-empty array",
                ))
            }
        };

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for (index, raw) in items.iter().enumerate() {
            match self.issue_item(tenant, &request, raw).await {
                Ok(success) => successful.push(success),
                Err(e) => {
                    tracing::info!(index, error = %e, "Bulk item rejected");
                    failed.push(failure_record(raw, &e));
                }
            }
        }

        tracing::info!(
            institute_id = %tenant.institute_id,
            issued = successful.len(),
            rejected = failed.len(),
            "Bulk issuance finished"
        );

        Ok(BulkIssueReport {
            success_count: successful.len(),
            failure_count: failed.len(),
            successful,
            failed,
        })
    }

    async fn issue_item(
        &self,
        tenant: Tenant,
        batch: &BulkIssueRequest,
        raw: &Value,
    ) -> AppResult<BulkSuccess> {
        let item: BulkIssueItem = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::validation(format!("malformed item: {}", e)))?;

        let template_id = present(&item.template_id).or(present(&batch.template_id));
        let award_date = present(&item.award_date).or(present(&batch.award_date));
        let (Some(email), Some(course_code), Some(template_id), Some(award_date)) = (
            present(&item.student_email),
            present(&item.course_code),
            template_id,
            award_date,
        ) else {
            return Err(AppError::validation(
                "studentEmail, courseCode, templateId and awardDate are required",
            ));
        };
        let template_id = parse_id(template_id, "templateId")?;
        let award_date = parse_award_date(award_date)?;

        let student = self
            .store
            .find_student_by_email(tenant.institute_id, email)
            .await?
            .ok_or_else(|| AppError::not_found("Student"))?;
        let course = self
            .store
            .find_course_by_code(tenant.institute_id, course_code)
            .await?
            .ok_or_else(|| AppError::not_found("Course"))?;
        let template = self.template(tenant, template_id).await?;

        let certificate = self
            .issue_for(tenant, &student, &course, &template, award_date)
            .await?;

        Ok(BulkSuccess {
            student_email: student.email,
            course_code: course.code,
            certificate_code: certificate.certificate_code,
        })
    }

    async fn template(&self, tenant: Tenant, template_id: Uuid) -> AppResult<Template> {
        self.store
            .find_template(tenant.institute_id, template_id)
            .await?
            .ok_or_else(|| AppError::not_found("Template"))
    }

    async fn issue_for(
        &self,
        tenant: Tenant,
        student: &Student,
        course: &Course,
        template: &Template,
        award_date: NaiveDate,
    ) -> AppResult<Certificate> {
        // Early rejection only; the storage constraint is what actually holds.
        if self
            .store
            .find_issued_certificate(tenant.institute_id, student.id, course.id)
            .await?
            .is_some()
        {
            return Err(AppError::conflict(
                "Certificate already issued for this student and course",
            ));
        }

        let institute = self.store.find_institute(tenant.institute_id).await?;
        let decorations = self.decorations(institute.as_ref(), template).await;

        let mut attempt = 0;
        let certificate = loop {
            attempt += 1;
            let code = generate_certificate_code(&self.settings.code_prefix);
            let qr_code_data = verification_url(&self.settings.base_url, &code);
            let qr_code = encode_data_url(&qr_code_data)
                .map_err(|e| AppError::Persistence(format!("QR generation failed: {}", e)))?;

            let printable = Printable {
                code: &code,
                student_name: &student.name,
                course_name: &course.name,
                award_date,
                qr_code: &qr_code,
            };
            let rendered = match self.render(&printable, template, &decorations, false).await {
                Ok(pdf) => Some(pdf),
                Err(e) => {
                    tracing::error!(code = %code, error = %e, "Certificate PDF rendering failed");
                    None
                }
            };

            let new = NewCertificate {
                certificate_code: code.clone(),
                institute_id: tenant.institute_id,
                student_id: student.id,
                course_id: course.id,
                template_id: template.id,
                student_name: student.name.clone(),
                course_name: course.name.clone(),
                award_date,
                qr_code,
                qr_code_data,
                certificate_url: rendered
                    .as_ref()
                    .map(|pdf| artifact_url(&pdf.file_name))
                    .unwrap_or_default(),
                issued_by: tenant.user_id,
                issued_at: Utc::now(),
            };

            let error = match self.store.insert_certificate(new).await {
                Ok(certificate) => break certificate,
                Err(e) => e,
            };
            if let Some(pdf) = &rendered {
                self.discard(pdf);
            }
            match error {
                StoreError::DuplicateCode if attempt < CODE_ATTEMPTS => {
                    tracing::warn!(code = %code, "Certificate code collision, regenerating");
                }
                StoreError::DuplicateCode => {
                    return Err(AppError::Persistence(
                        "could not allocate a unique certificate code".to_string(),
                    ));
                }
                e => return Err(e.into()),
            }
        };

        if student.status != ENROLLMENT_COMPLETED {
            if let Err(e) = self
                .store
                .mark_student_completed(tenant.institute_id, student.id)
                .await
            {
                tracing::warn!(student_id = %student.id, error = %e, "Could not mark enrollment completed");
            }
        }

        tracing::info!(
            code = %certificate.certificate_code,
            institute_id = %tenant.institute_id,
            student_id = %student.id,
            course_id = %course.id,
            has_pdf = !certificate.certificate_url.is_empty(),
            "Certificate issued"
        );

        Ok(certificate)
    }

    /// Re-renders the PDF from the stored record and points the record at it.
    pub async fn regenerate(&self, tenant: Tenant, certificate_id: Uuid) -> AppResult<Certificate> {
        let certificate = self
            .store
            .find_certificate(tenant.institute_id, certificate_id)
            .await?
            .ok_or_else(|| AppError::not_found("Certificate"))?;
        let template = self.template(tenant, certificate.template_id).await?;
        let institute = self.store.find_institute(tenant.institute_id).await?;
        let decorations = self.decorations(institute.as_ref(), &template).await;

        let printable = Printable {
            code: &certificate.certificate_code,
            student_name: &certificate.student_name,
            course_name: &certificate.course_name,
            award_date: certificate.award_date,
            qr_code: &certificate.qr_code,
        };
        let pdf = self
            .render(&printable, &template, &decorations, true)
            .await
            .map_err(|e| AppError::Unavailable(format!("Certificate rendering failed: {}", e)))?;

        tracing::info!(code = %certificate.certificate_code, "Certificate PDF regenerated");

        self.store
            .set_certificate_url(tenant.institute_id, certificate.id, &artifact_url(&pdf.file_name))
            .await?
            .ok_or_else(|| AppError::not_found("Certificate"))
    }

    async fn decorations(&self, institute: Option<&Institute>, template: &Template) -> Decorations {
        Decorations {
            institute_name: institute.map(|i| i.name.clone()).unwrap_or_default(),
            background: self
                .assets
                .load_optional("background", template.background_image.as_deref())
                .await,
            logo: self
                .assets
                .load_optional("logo", institute.and_then(|i| i.logo.as_deref()))
                .await,
            signature: self
                .assets
                .load_optional("signature", institute.and_then(|i| i.signature.as_deref()))
                .await,
        }
    }

    async fn render(
        &self,
        printable: &Printable<'_>,
        template: &Template,
        decorations: &Decorations,
        replace_existing: bool,
    ) -> Result<RenderedPdf, RenderError> {
        let job = RenderJob {
            certificate_code: printable.code.to_string(),
            student_name: printable.student_name.to_string(),
            course_name: printable.course_name.to_string(),
            award_date: printable.award_date,
            institute_name: decorations.institute_name.clone(),
            template: template.clone(),
            qr_code: printable.qr_code.to_string(),
            background: decorations.background.clone(),
            logo: decorations.logo.clone(),
            signature: decorations.signature.clone(),
            replace_existing,
        };
        self.renderer.render(job).await
    }

    fn discard(&self, pdf: &RenderedPdf) {
        if let Err(e) = self.renderer.discard(pdf) {
            tracing::warn!(file = %pdf.file_name, error = %e, "Could not remove orphaned PDF");
        }
    }
}

fn failure_record(raw: &Value, error: &AppError) -> Value {
    match raw {
        Value::Object(fields) => {
            let mut record = fields.clone();
            record.insert("error".to_string(), Value::String(error.to_string()));
            Value::Object(record)
        }
        other => serde_json::json!({ "item": other, "error": error.to_string() }),
    }
}
