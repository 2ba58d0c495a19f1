#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    PayrollOfficer = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::PayrollOfficer),
            _ => None,
        }
    }

    /// May compute, preview and recompute payroll.
    pub fn can_process_payroll(self) -> bool {
        matches!(self, Role::Admin | Role::Hr | Role::PayrollOfficer)
    }
}
