//! In-process [`Store`] used by unit tests.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    Certificate, CertificateFilter, CertificatePage, CertificateStatus, Course, Institute,
    IssueMetadata, NewCertificate, Pagination, Revocation, Store, StoreError, StoreResult,
    Student, Template, ENROLLMENT_COMPLETED,
};

#[derive(Default)]
struct Tables {
    institutes: Vec<Institute>,
    courses: Vec<Course>,
    students: Vec<Student>,
    templates: Vec<Template>,
    certificates: Vec<Certificate>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Number of upcoming inserts to reject as code collisions.
    forced_collisions: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_institute(&self, institute: Institute) {
        self.tables.lock().unwrap().institutes.push(institute);
    }

    pub fn add_course(&self, course: Course) {
        self.tables.lock().unwrap().courses.push(course);
    }

    pub fn add_student(&self, student: Student) {
        self.tables.lock().unwrap().students.push(student);
    }

    pub fn add_template(&self, template: Template) {
        self.tables.lock().unwrap().templates.push(template);
    }

    pub fn collide_next(&self, inserts: usize) {
        *self.forced_collisions.lock().unwrap() = inserts;
    }

    pub fn student(&self, student_id: Uuid) -> Option<Student> {
        self.tables
            .lock()
            .unwrap()
            .students
            .iter()
            .find(|s| s.id == student_id)
            .cloned()
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.tables.lock().unwrap().certificates.clone()
    }

    fn update_certificate<F>(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        apply: F,
    ) -> Option<Certificate>
    where
        F: FnOnce(&mut Certificate) -> bool,
    {
        let mut tables = self.tables.lock().unwrap();
        let cert = tables
            .certificates
            .iter_mut()
            .find(|c| c.id == certificate_id && c.institute_id == institute_id)?;
        if apply(cert) {
            Some(cert.clone())
        } else {
            None
        }
    }
}

impl Store for MemoryStore {
    async fn find_institute(&self, institute_id: Uuid) -> StoreResult<Option<Institute>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.institutes.iter().find(|i| i.id == institute_id).cloned())
    }

    async fn find_student(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
    ) -> StoreResult<Option<Student>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .students
            .iter()
            .find(|s| s.id == student_id && s.institute_id == institute_id)
            .cloned())
    }

    async fn find_student_by_email(
        &self,
        institute_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<Student>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .students
            .iter()
            .find(|s| s.institute_id == institute_id && s.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn find_course(
        &self,
        institute_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Course>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .courses
            .iter()
            .find(|c| c.id == course_id && c.institute_id == institute_id)
            .cloned())
    }

    async fn find_course_by_code(
        &self,
        institute_id: Uuid,
        code: &str,
    ) -> StoreResult<Option<Course>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .courses
            .iter()
            .find(|c| c.institute_id == institute_id && c.code.eq_ignore_ascii_case(code.trim()))
            .cloned())
    }

    async fn find_template(
        &self,
        institute_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<Template>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .templates
            .iter()
            .find(|t| t.id == template_id && t.institute_id == institute_id)
            .cloned())
    }

    async fn mark_student_completed(&self, institute_id: Uuid, student_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(student) = tables
            .students
            .iter_mut()
            .find(|s| s.id == student_id && s.institute_id == institute_id)
        {
            student.status = ENROLLMENT_COMPLETED.to_string();
        }
        Ok(())
    }

    async fn find_issued_certificate(
        &self,
        institute_id: Uuid,
        student_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .certificates
            .iter()
            .find(|c| {
                c.institute_id == institute_id
                    && c.student_id == student_id
                    && c.course_id == course_id
                    && c.status == CertificateStatus::Issued
            })
            .cloned())
    }

    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
        let mut tables = self.tables.lock().unwrap();

        let forced = {
            let mut pending = self.forced_collisions.lock().unwrap();
            let forced = *pending > 0;
            *pending = pending.saturating_sub(1);
            forced
        };
        let code_taken = forced
            || tables
                .certificates
                .iter()
                .any(|c| c.certificate_code == new.certificate_code);
        if code_taken {
            return Err(StoreError::DuplicateCode);
        }

        let already_issued = tables.certificates.iter().any(|c| {
            c.institute_id == new.institute_id
                && c.student_id == new.student_id
                && c.course_id == new.course_id
                && c.status == CertificateStatus::Issued
        });
        if already_issued {
            return Err(StoreError::AlreadyIssued);
        }

        let now = Utc::now();
        let certificate = Certificate {
            id: Uuid::new_v4(),
            certificate_code: new.certificate_code,
            institute_id: new.institute_id,
            student_id: new.student_id,
            course_id: new.course_id,
            template_id: new.template_id,
            student_name: new.student_name,
            course_name: new.course_name,
            award_date: new.award_date,
            qr_code: new.qr_code,
            qr_code_data: new.qr_code_data,
            certificate_url: new.certificate_url,
            status: CertificateStatus::Issued,
            email_sent: false,
            email_sent_at: None,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
            metadata: IssueMetadata {
                issued_by: new.issued_by,
                issued_at: new.issued_at,
            },
            created_at: now,
            updated_at: now,
        };
        tables.certificates.push(certificate.clone());
        Ok(certificate)
    }

    async fn find_certificate(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
    ) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .certificates
            .iter()
            .find(|c| c.id == certificate_id && c.institute_id == institute_id)
            .cloned())
    }

    async fn find_certificate_by_code(&self, code: &str) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .certificates
            .iter()
            .find(|c| c.certificate_code == code)
            .cloned())
    }

    async fn revoke_certificate(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        revocation: Revocation,
    ) -> StoreResult<Option<Certificate>> {
        Ok(self.update_certificate(institute_id, certificate_id, |cert| {
            if cert.status != CertificateStatus::Issued {
                return false;
            }
            cert.status = CertificateStatus::Revoked;
            cert.revoked_at = Some(revocation.revoked_at);
            cert.revoked_by = Some(revocation.revoked_by);
            cert.revocation_reason = Some(revocation.reason);
            cert.updated_at = revocation.revoked_at;
            true
        }))
    }

    async fn set_certificate_url(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        url: &str,
    ) -> StoreResult<Option<Certificate>> {
        Ok(self.update_certificate(institute_id, certificate_id, |cert| {
            cert.certificate_url = url.to_string();
            cert.updated_at = Utc::now();
            true
        }))
    }

    async fn mark_email_sent(
        &self,
        institute_id: Uuid,
        certificate_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> StoreResult<Option<Certificate>> {
        Ok(self.update_certificate(institute_id, certificate_id, |cert| {
            cert.email_sent = true;
            cert.email_sent_at = Some(sent_at);
            cert.updated_at = sent_at;
            true
        }))
    }

    async fn list_certificates(
        &self,
        institute_id: Uuid,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> StoreResult<CertificatePage> {
        let tables = self.tables.lock().unwrap();
        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut matching: Vec<Certificate> = tables
            .certificates
            .iter()
            .filter(|c| c.institute_id == institute_id)
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| {
                needle.as_ref().map_or(true, |n| {
                    c.certificate_code.to_lowercase().contains(n)
                        || c.student_name.to_lowercase().contains(n)
                        || c.course_name.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let certificates = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(CertificatePage {
            certificates,
            total,
            page: pagination.page,
            limit: pagination.limit,
        })
    }
}
