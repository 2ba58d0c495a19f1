use actix_web::error::{ErrorForbidden, ErrorUnauthorized};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::model::role::Role;

/// Caller identity placed in request extensions by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    pub organization_id: u64,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing token")),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ErrorForbidden("Admin only"))
        }
    }

    pub fn require_hr_or_admin(&self) -> actix_web::Result<()> {
        if matches!(self.role, Role::Admin | Role::Hr) {
            Ok(())
        } else {
            Err(ErrorForbidden("HR/Admin only"))
        }
    }

    pub fn require_payroll_access(&self) -> actix_web::Result<()> {
        if self.role.can_process_payroll() {
            Ok(())
        } else {
            Err(ErrorForbidden("Payroll staff only"))
        }
    }

    /// The caller's own employee record, for self-service endpoints.
    pub fn employee_id(&self) -> actix_web::Result<u64> {
        self.employee_id.ok_or_else(|| ErrorForbidden("No employee profile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "maria".into(),
            role,
            organization_id: 7,
            employee_id: None,
        }
    }

    #[test]
    fn role_gates() {
        assert!(user(Role::Admin).require_admin().is_ok());
        assert!(user(Role::Hr).require_admin().is_err());
        assert!(user(Role::Hr).require_hr_or_admin().is_ok());
        assert!(user(Role::PayrollOfficer).require_hr_or_admin().is_err());
        assert!(user(Role::PayrollOfficer).require_payroll_access().is_ok());
        assert!(user(Role::Employee).require_payroll_access().is_err());
        assert!(user(Role::Employee).employee_id().is_err());
    }
}
