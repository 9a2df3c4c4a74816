use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::StoreError;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institute {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub status: String,
    pub logo: Option<String>,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

pub const ENROLLMENT_COMPLETED: &str = "completed";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub course_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    StudentName,
    CourseName,
    AwardDate,
    CertificateCode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

fn default_font_size() -> f64 {
    24.0
}

fn default_font_color() -> String {
    "#000000".to_string()
}

fn default_font_family() -> String {
    "Helvetica".to_string()
}

/// Placement of one dynamic field, in the background image's pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPlacement {
    pub field_name: FieldName,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_font_color")]
    pub font_color: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QrPlacement {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl Default for QrPlacement {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            size: 100.0,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub course_id: Option<Uuid>,
    pub name: String,
    pub background_image: Option<String>,
    pub fields: Json<Vec<FieldPlacement>>,
    pub qr_code_position: Json<QrPlacement>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn placement(&self, field: FieldName) -> Option<&FieldPlacement> {
        self.fields.iter().find(|f| f.field_name == field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Issued,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Issued => "issued",
            CertificateStatus::Revoked => "revoked",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "issued" => Some(CertificateStatus::Issued),
            "revoked" => Some(CertificateStatus::Revoked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueMetadata {
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub certificate_code: String,
    pub institute_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub template_id: Uuid,
    pub student_name: String,
    pub course_name: String,
    pub award_date: NaiveDate,
    pub qr_code: String,
    pub qr_code_data: String,
    pub certificate_url: String,
    pub status: CertificateStatus,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub revocation_reason: Option<String>,
    pub metadata: IssueMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `certificates` table.
#[derive(Debug, FromRow)]
pub struct CertificateRow {
    pub id: Uuid,
    pub certificate_code: String,
    pub institute_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub template_id: Uuid,
    pub student_name: String,
    pub course_name: String,
    pub award_date: NaiveDate,
    pub qr_code: String,
    pub qr_code_data: String,
    pub certificate_url: String,
    pub status: String,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub revocation_reason: Option<String>,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = StoreError;

    fn try_from(row: CertificateRow) -> Result<Self, Self::Error> {
        let status = CertificateStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "certificate {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;
        Ok(Certificate {
            id: row.id,
            certificate_code: row.certificate_code,
            institute_id: row.institute_id,
            student_id: row.student_id,
            course_id: row.course_id,
            template_id: row.template_id,
            student_name: row.student_name,
            course_name: row.course_name,
            award_date: row.award_date,
            qr_code: row.qr_code,
            qr_code_data: row.qr_code_data,
            certificate_url: row.certificate_url,
            status,
            email_sent: row.email_sent,
            email_sent_at: row.email_sent_at,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
            revocation_reason: row.revocation_reason,
            metadata: IssueMetadata {
                issued_by: row.issued_by,
                issued_at: row.issued_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Everything the engine knows about a certificate before it is persisted.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub certificate_code: String,
    pub institute_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub template_id: Uuid,
    pub student_name: String,
    pub course_name: String,
    pub award_date: NaiveDate,
    pub qr_code: String,
    pub qr_code_data: String,
    pub certificate_url: String,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Revocation {
    pub revoked_by: Uuid,
    pub reason: String,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub status: Option<CertificateStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(20).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePage {
    pub certificates: Vec<Certificate>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
