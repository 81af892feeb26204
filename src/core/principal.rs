//! The authenticated principal.
//!
//! Identity and role are resolved once at the boundary (see
//! [`crate::core::accounts::resolve_principal`]) and passed explicitly into every core
//! call. The core never probes related records to guess who the caller is.

use crate::errors::{Error, Result};
pub use crate::entities::account::Role;

/// Who is calling, and in which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub account_id: i64,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub const fn new(account_id: i64, role: Role) -> Self {
        Self { account_id, role }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Fails with [`Error::PermissionDenied`] unless the role is one of `allowed`.
    pub fn require(&self, allowed: &[Role], action: &'static str) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::PermissionDenied { action })
        }
    }
}
