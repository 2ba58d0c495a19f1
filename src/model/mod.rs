pub mod attendance;
pub mod audit;
pub mod compensation;
pub mod contribution;
pub mod employee;
pub mod late_policy;
pub mod leave_request;
pub mod payroll;
pub mod payroll_period;
pub mod role;
pub mod schedule;
