use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    Certificate, CertificateFilter, CertificatePage, CertificateRow, Course, DbPool, Institute,
    NewCertificate, Pagination, Revocation, Store, StoreError, StoreResult, Student, Template,
    ENROLLMENT_COMPLETED,
};

const CODE_CONSTRAINT: &str = "certificates_certificate_code_key";
const ISSUED_INDEX: &str = "certificates_one_issued_per_enrollment";

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_certificate(row: Option<CertificateRow>) -> StoreResult<Option<Certificate>> {
    row.map(Certificate::try_from).transpose()
}

/// Maps unique violations onto the two uniqueness rules the engine cares about.
fn classify_insert_error(err: sqlx::Error) -> StoreError {
    let violated = err
        .as_database_error()
        .filter(|db_err| db_err.is_unique_violation())
        .map(|db_err| db_err.constraint().map(str::to_owned));

    match violated {
        Some(Some(name)) if name == CODE_CONSTRAINT => StoreError::DuplicateCode,
        Some(Some(name)) if name == ISSUED_INDEX => StoreError::AlreadyIssued,
        _ => StoreError::Database(err),
    }
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let escaped = s
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
}

impl Store for PgStore {
    async fn find_institute(&self, institute_id: Uuid) -> StoreResult<Option<Institute>> {
        let institute =
            sqlx::query_as::<_, Institute>("SELECT * FROM institutes WHERE id = $1")
                .bind(institute_id)
                .fetch_optional(self.pool.as_ref())
                .await?;
        Ok(institute)
    }

    async fn find_student(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
    ) -> StoreResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT * FROM students WHERE id = $1 AND institute_id = $2",
        )
        .bind(student_id)
        .bind(institute_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(student)
    }

    async fn find_student_by_email(
        &self,
        institute_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT * FROM students WHERE institute_id = $1 AND lower(email) = lower($2)",
        )
        .bind(institute_id)
        .bind(email.trim())
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(student)
    }

    async fn find_course(
        &self,
        institute_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT * FROM courses WHERE id = $1 AND institute_id = $2",
        )
        .bind(course_id)
        .bind(institute_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(course)
    }

    async fn find_course_by_code(
        &self,
        institute_id: Uuid,
        code: &str,
    ) -> StoreResult<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT * FROM courses WHERE institute_id = $1 AND upper(code) = upper($2)",
        )
        .bind(institute_id)
        .bind(code.trim())
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(course)
    }

    async fn find_template(
        &self,
        institute_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<Template>> {
        let template = sqlx::query_as::<_, Template>(
            "SELECT * FROM templates WHERE id = $1 AND institute_id = $2",
        )
        .bind(template_id)
        .bind(institute_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(template)
    }

    async fn mark_student_completed(&self, institute_id: Uuid, student_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE students SET status = $3
            WHERE id = $1 AND institute_id = $2 AND status <> $3
            "#,
        )
        .bind(student_id)
        .bind(institute_id)
        .bind(ENROLLMENT_COMPLETED)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn find_issued_certificate(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            SELECT * FROM certificates
            WHERE institute_id = $1 AND student_id = $2 AND course_id = $3 AND status = 'issued'
            "#,
        )
        .bind(institute_id)
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        into_certificate(row)
    }

    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            INSERT INTO certificates (
                id, certificate_code, institute_id, student_id, course_id, template_id,
                student_name, course_name, award_date, qr_code, qr_code_data, certificate_url,
                status, issued_by, issued_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'issued', $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.certificate_code)
        .bind(new.institute_id)
        .bind(new.student_id)
        .bind(new.course_id)
        .bind(new.template_id)
        .bind(&new.student_name)
        .bind(&new.course_name)
        .bind(new.award_date)
        .bind(&new.qr_code)
        .bind(&new.qr_code_data)
        .bind(&new.certificate_url)
        .bind(new.issued_by)
        .bind(new.issued_at)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(classify_insert_error)?;
        Certificate::try_from(row)
    }

    async fn find_certificate(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
    ) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE id = $1 AND institute_id = $2",
        )
        .bind(certificate_id)
        .bind(institute_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        into_certificate(row)
    }

    async fn find_certificate_by_code(&self, code: &str) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE certificate_code = $1",
        )
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;
        into_certificate(row)
    }

    async fn revoke_certificate(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        revocation: Revocation,
    ) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            UPDATE certificates
            SET status = 'revoked', revoked_at = $3, revoked_by = $4, revocation_reason = $5,
                updated_at = $3
            WHERE id = $1 AND institute_id = $2 AND status = 'issued'
            RETURNING *
            "#,
        )
        .bind(certificate_id)
        .bind(institute_id)
        .bind(revocation.revoked_at)
        .bind(revocation.revoked_by)
        .bind(&revocation.reason)
        .fetch_optional(self.pool.as_ref())
        .await?;
        into_certificate(row)
    }

    async fn set_certificate_url(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        url: &str,
    ) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            UPDATE certificates SET certificate_url = $3, updated_at = now()
            WHERE id = $1 AND institute_id = $2
            RETURNING *
            "#,
        )
        .bind(certificate_id)
        .bind(institute_id)
        .bind(url)
        .fetch_optional(self.pool.as_ref())
        .await?;
        into_certificate(row)
    }

    async fn mark_email_sent(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            UPDATE certificates SET email_sent = true, email_sent_at = $3, updated_at = $3
            WHERE id = $1 AND institute_id = $2
            RETURNING *
            "#,
        )
        .bind(certificate_id)
        .bind(institute_id)
        .bind(sent_at)
        .fetch_optional(self.pool.as_ref())
        .await?;
        into_certificate(row)
    }

    async fn list_certificates(
        &self,
        institute_id: Uuid,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> StoreResult<CertificatePage> {
        let status = filter.status.map(|s| s.as_str());
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM certificates
            WHERE institute_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR certificate_code ILIKE $3
                   OR student_name ILIKE $3 OR course_name ILIKE $3)
            "#,
        )
        .bind(institute_id)
        .bind(status)
        .bind(&pattern)
        .fetch_one(self.pool.as_ref())
        .await?;

        let rows = sqlx::query_as::<_, CertificateRow>(
            r#"
            SELECT * FROM certificates
            WHERE institute_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR certificate_code ILIKE $3
                   OR student_name ILIKE $3 OR course_name ILIKE $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(institute_id)
        .bind(status)
        .bind(&pattern)
        .bind(i64::from(pagination.limit))
        .bind(pagination.offset() as i64)
        .fetch_all(self.pool.as_ref())
        .await?;

        let certificates = rows
            .into_iter()
            .map(Certificate::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(CertificatePage {
            certificates,
            total: total.max(0) as u64,
            page: pagination.page,
            limit: pagination.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::search_pattern;

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(search_pattern(Some(" 50%_off ")).as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(None), None);
    }

    #[test]
    fn search_pattern_escapes_backslashes_first() {
        // A trailing backslash must not swallow the closing wildcard.
        assert_eq!(search_pattern(Some("C:\\")).as_deref(), Some("%C:\\\\%"));
        assert_eq!(search_pattern(Some("a\\%")).as_deref(), Some("%a\\\\\\%%"));
    }
}
