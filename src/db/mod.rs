mod models;
mod postgres;

#[cfg(test)]
pub mod memory;

pub use models::*;
pub use postgres::PgStore;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

pub type DbPool = Arc<PgPool>;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("certificate code already exists")]
    DuplicateCode,

    #[error("an issued certificate already exists for this student and course")]
    AlreadyIssued,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Data access for the issuance pipeline.
///
/// Every tenant-scoped lookup takes the institute id explicitly; an entity that
/// exists under another institute is reported as absent. Implementations must
/// reject a second `issued` certificate for the same
/// `(institute, student, course)` atomically with respect to concurrent inserts.
pub trait Store: Send + Sync {
    fn find_institute(
        &self,
        institute_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Institute>>> + Send;

    fn find_student(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Student>>> + Send;

    fn find_student_by_email(
        &self,
        institute_id: Uuid,
        email: &str,
    ) -> impl Future<Output = StoreResult<Option<Student>>> + Send;

    fn find_course(
        &self,
        institute_id: Uuid,
        course_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Course>>> + Send;

    fn find_course_by_code(
        &self,
        institute_id: Uuid,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Course>>> + Send;

    fn find_template(
        &self,
        institute_id: Uuid,
        template_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Template>>> + Send;

    /// Sets the student's status to completed; a no-op when it already is.
    fn mark_student_completed(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn find_issued_certificate(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
        course_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;

    /// Fails with [`StoreError::DuplicateCode`] or [`StoreError::AlreadyIssued`]
    /// when the corresponding uniqueness rule is violated.
    fn insert_certificate(
        &self,
        certificate: NewCertificate,
    ) -> impl Future<Output = StoreResult<Certificate>> + Send;

    fn find_certificate(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;

    /// Public lookup; not tenant-scoped.
    fn find_certificate_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;

    /// Moves an `issued` certificate to `revoked`. Returns `None` when no
    /// certificate of this tenant was in the `issued` state.
    fn revoke_certificate(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        revocation: Revocation,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;

    fn set_certificate_url(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        url: &str,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;

    fn mark_email_sent(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;

    fn list_certificates(
        &self,
        institute_id: Uuid,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> impl Future<Output = StoreResult<CertificatePage>> + Send;
}
