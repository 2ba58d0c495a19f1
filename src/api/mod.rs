pub mod attendance;
pub mod compensation;
pub mod payroll;
pub mod period;
pub mod policy;
