pub mod attendance;
pub mod batch;
pub mod contributions;
pub mod late_policy;
pub mod payroll;
pub mod periods;
pub mod schedule;
