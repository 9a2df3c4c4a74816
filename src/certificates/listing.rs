use serde::Deserialize;

use super::Tenant;
use crate::db::{CertificateFilter, CertificatePage, CertificateStatus, Pagination, Store};
use crate::error::{AppError, AppResult};

/// Query string of the listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list<S: Store>(store: &S, tenant: Tenant, query: ListQuery) -> AppResult<CertificatePage> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None | Some("all") => None,
        Some(raw) => Some(
            CertificateStatus::parse(raw)
                .ok_or_else(|| AppError::validation(format!("unknown status {:?}", raw)))?,
        ),
    };

    let filter = CertificateFilter {
        status,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let pagination = Pagination::new(query.page, query.limit);

    Ok(store
        .list_certificates(tenant.institute_id, filter, pagination)
        .await?)
}
