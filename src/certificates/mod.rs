//! The certificate issuance and verification pipeline.

pub mod code;
pub mod issuance;
pub mod link;
pub mod listing;
pub mod notify;
pub mod qr;
pub mod revocation;
pub mod verification;

use uuid::Uuid;

/// The institute a request acts for, and the user acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenant {
    pub institute_id: Uuid,
    pub user_id: Uuid,
}
